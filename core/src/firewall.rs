use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::in_subnet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Subnet {
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        in_subnet(self.network, ip, self.mask)
    }
}

/// Matches a (source, destination, port) tuple. Absent fields match anything;
/// a rule with a port never matches portless traffic such as echo requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Subnet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Subnet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl FirewallRule {
    pub fn deny() -> Self {
        Self {
            action: RuleAction::Deny,
            source: None,
            destination: None,
            port: None,
        }
    }

    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            ..Self::deny()
        }
    }

    pub fn from_subnet(mut self, network: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.source = Some(Subnet { network, mask });
        self
    }

    pub fn to_subnet(mut self, network: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.destination = Some(Subnet { network, mask });
        self
    }

    pub fn on_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn matches(&self, source: Ipv4Addr, destination: Ipv4Addr, port: Option<u16>) -> bool {
        self.source.map_or(true, |s| s.contains(source))
            && self.destination.map_or(true, |d| d.contains(destination))
            && self.port.map_or(true, |p| port == Some(p))
    }
}

/// First matching rule decides; the default action applies otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallPolicy {
    pub rules: Vec<FirewallRule>,
    pub default_action: RuleAction,
}

impl Default for FirewallPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_action: RuleAction::Allow,
        }
    }
}

impl FirewallPolicy {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn permits(&self, source: Ipv4Addr, destination: Ipv4Addr, port: Option<u16>) -> bool {
        let action = self
            .rules
            .iter()
            .find(|r| r.matches(source, destination, port))
            .map_or(self.default_action, |r| r.action);
        action == RuleAction::Allow
    }
}
