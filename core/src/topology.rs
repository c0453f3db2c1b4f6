use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::MacAddr;
use crate::firewall::FirewallPolicy;
use crate::routing::StaticRoute;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    #[serde(alias = "computer")]
    Host,
    Switch,
    Router,
    Hub,
    AccessPoint,
    Firewall,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 6] = [
        DeviceKind::Host,
        DeviceKind::Switch,
        DeviceKind::Router,
        DeviceKind::Hub,
        DeviceKind::AccessPoint,
        DeviceKind::Firewall,
    ];

    /// Whether interfaces of this kind carry IP configuration.
    pub fn is_addressable(self) -> bool {
        matches!(self, DeviceKind::Host | DeviceKind::Router | DeviceKind::Firewall)
    }

    /// Whether the device runs a routing table (as opposed to a single gateway).
    pub fn is_routed(self) -> bool {
        matches!(self, DeviceKind::Router | DeviceKind::Firewall)
    }

    /// Whether the device keeps a MAC address table.
    pub fn learns(self) -> bool {
        matches!(self, DeviceKind::Switch | DeviceKind::AccessPoint)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeviceKind::Host => "host",
            DeviceKind::Switch => "switch",
            DeviceKind::Router => "router",
            DeviceKind::Hub => "hub",
            DeviceKind::AccessPoint => "accessPoint",
            DeviceKind::Firewall => "firewall",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        })
    }
}

/// Canvas coordinates. Stored and persisted, never interpreted by the core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            mac,
            ip: None,
            mask: None,
            gateway: None,
        }
    }

    /// The (ip, mask) pair; the store keeps both present or both absent.
    pub fn address(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        self.ip.zip(self.mask)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub name: String,
    pub position: Position,
    pub power: PowerState,
    pub interfaces: Vec<Interface>,
    pub routes: Vec<StaticRoute>,
    pub firewall: FirewallPolicy,
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    pub fn is_on(&self) -> bool {
        self.power == PowerState::On
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub(crate) fn interface_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.interfaces.iter_mut().find(|i| i.name == name)
    }

    /// The interface holding `ip`, if this device owns that address.
    pub fn interface_with_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == Some(ip))
    }

    pub fn addressed_interfaces(&self) -> impl Iterator<Item = (&Interface, Ipv4Addr, Ipv4Addr)> {
        self.interfaces
            .iter()
            .filter_map(|i| i.address().map(|(ip, mask)| (i, ip, mask)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub device: DeviceId,
    pub interface: String,
}

impl Endpoint {
    pub fn new(device: &DeviceId, interface: &str) -> Self {
        Self {
            device: device.clone(),
            interface: interface.to_string(),
        }
    }

    pub fn is(&self, device: &DeviceId, interface: &str) -> bool {
        &self.device == device && self.interface == interface
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.interface)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Copy, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkConfig {
    pub latency_us: u64,  // One-way latency per traversal
    pub jitter_us: u64,   // Upper bound of the random extra delay
    pub loss_rate: f32,   // Probability of losing a traversal (0.0 - 1.0)
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_us: crate::DEFAULT_LINK_LATENCY_US,
            jitter_us: 0,
            loss_rate: 0.0,
        }
    }
}

impl LinkConfig {
    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    pub fn with_loss_rate(mut self, loss_rate: f32) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    pub fn with_jitter_us(mut self, jitter_us: u64) -> Self {
        self.jitter_us = jitter_us;
        self
    }
}

/// An undirected cable between two endpoints. `a` is the endpoint the
/// connection was made from; it owns the record in the saved file.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
    pub state: LinkState,
    pub config: LinkConfig,
}

impl Link {
    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    pub fn touches(&self, device: &DeviceId) -> bool {
        &self.a.device == device || &self.b.device == device
    }

    pub fn has_endpoint(&self, device: &DeviceId, interface: &str) -> bool {
        self.a.is(device, interface) || self.b.is(device, interface)
    }

    /// The far end as seen from `(device, interface)`.
    pub fn peer_of(&self, device: &DeviceId, interface: &str) -> Option<&Endpoint> {
        if self.a.is(device, interface) {
            Some(&self.b)
        } else if self.b.is(device, interface) {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// An immutable view of the whole graph. The store publishes a fresh one
/// after every successful mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub devices: Vec<Device>,
    pub links: BTreeMap<Endpoint, Link>,
}

impl Topology {
    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub(crate) fn device_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| &d.id == id)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn link_at(&self, device: &DeviceId, interface: &str) -> Option<&Link> {
        self.links.values().find(|l| l.has_endpoint(device, interface))
    }

    pub(crate) fn link_key_at(&self, device: &DeviceId, interface: &str) -> Option<Endpoint> {
        self.link_at(device, interface).map(|l| l.a.clone())
    }

    pub fn peer(&self, device: &DeviceId, interface: &str) -> Option<&Endpoint> {
        self.link_at(device, interface)
            .and_then(|l| l.peer_of(device, interface))
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn links_of<'a>(&'a self, device: &'a DeviceId) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |l| l.touches(device))
    }

    /// First device (in insertion order) with an interface holding `ip`.
    pub fn owner_of_ip(&self, ip: Ipv4Addr) -> Option<(&Device, &Interface)> {
        self.devices
            .iter()
            .find_map(|d| d.interface_with_ip(ip).map(|i| (d, i)))
    }
}
