//! The topology file: `{"devices": [...]}` with each device carrying its
//! interfaces and the connections it owns.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::addr::{parse_ipv4, parse_mask, MacAddr};
use crate::components;
use crate::error::{NetError, Result};
use crate::firewall::FirewallPolicy;
use crate::routing::StaticRoute;
use crate::store::{insert_link, validate_link_config};
use crate::topology::{
    Device, DeviceId, DeviceKind, Endpoint, Interface, Link, LinkConfig, LinkState, Position,
    PowerState, Topology,
};

#[derive(Serialize, Deserialize)]
struct TopologyRecord {
    devices: Vec<DeviceRecord>,
}

/// Files written by the old editor are a bare device array.
#[derive(Deserialize)]
#[serde(untagged)]
enum FileShape {
    Wrapped(TopologyRecord),
    Bare(Vec<DeviceRecord>),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    id: DeviceId,
    #[serde(alias = "type")]
    kind: DeviceKind,
    name: String,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default, skip_serializing)]
    x: Option<f64>,
    #[serde(default, skip_serializing)]
    y: Option<f64>,
    #[serde(default)]
    interfaces: Vec<InterfaceRecord>,
    #[serde(default)]
    connections: Vec<ConnectionRecord>,
    #[serde(default = "powered_off")]
    status: PowerState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    routes: Vec<StaticRoute>,
    #[serde(default, skip_serializing_if = "FirewallPolicy::is_default")]
    firewall: FirewallPolicy,
    #[serde(default)]
    configuration: serde_json::Map<String, serde_json::Value>,
}

fn powered_off() -> PowerState {
    PowerState::Off
}

#[derive(Serialize, Deserialize)]
struct InterfaceRecord {
    name: String,
    mac: MacAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gateway: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRecord {
    target_id: DeviceId,
    source_interface: String,
    target_interface: String,
    status: LinkState,
    #[serde(flatten)]
    config: LinkConfig,
}

fn optional_address(
    text: Option<&str>,
    parse: fn(&str) -> Result<Ipv4Addr>,
) -> Result<Option<Ipv4Addr>> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse(text).map(Some),
    }
}

impl InterfaceRecord {
    fn into_interface(self) -> Result<Interface> {
        let ip = optional_address(self.ip.as_deref(), parse_ipv4)?;
        let mask = optional_address(self.subnet.as_deref(), parse_mask)?;
        if ip.is_some() != mask.is_some() {
            return Err(NetError::InvalidAddress(format!(
                "interface {} needs both an address and a mask",
                self.name
            )));
        }
        Ok(Interface {
            name: self.name,
            mac: self.mac,
            ip,
            mask,
            gateway: optional_address(self.gateway.as_deref(), parse_ipv4)?,
        })
    }

    fn from_interface(iface: &Interface) -> Self {
        Self {
            name: iface.name.clone(),
            mac: iface.mac,
            ip: iface.ip.map(|ip| ip.to_string()),
            subnet: iface.mask.map(|mask| mask.to_string()),
            gateway: iface.gateway.map(|gw| gw.to_string()),
        }
    }
}

impl Topology {
    pub fn from_json(text: &str) -> Result<Topology> {
        let records = match serde_json::from_str::<FileShape>(text)? {
            FileShape::Wrapped(file) => file.devices,
            FileShape::Bare(devices) => devices,
        };

        let mut topology = Topology::default();
        let mut pending = Vec::new();
        for record in records {
            if topology.device(&record.id).is_some() {
                return Err(NetError::DuplicateDevice(record.id));
            }
            let position = record.position.unwrap_or(Position {
                x: record.x.unwrap_or_default(),
                y: record.y.unwrap_or_default(),
            });
            let interfaces = record
                .interfaces
                .into_iter()
                .map(InterfaceRecord::into_interface)
                .collect::<Result<Vec<_>>>()?;
            for conn in record.connections {
                pending.push((record.id.clone(), conn));
            }
            topology.devices.push(Device {
                id: record.id,
                kind: record.kind,
                name: record.name,
                position,
                power: record.status,
                interfaces,
                routes: record.routes,
                firewall: record.firewall,
                configuration: record.configuration,
            });
        }

        let mut rng = StdRng::seed_from_u64(topology.devices.len() as u64);
        for (owner, conn) in pending {
            validate_link_config(&conn.config)?;
            let mut link = Link {
                a: Endpoint::new(&owner, &conn.source_interface),
                b: Endpoint::new(&conn.target_id, &conn.target_interface),
                state: conn.status,
                config: conn.config,
            };
            let mirrored = topology
                .link_at(&link.b.device, &link.b.interface)
                .map_or(false, |existing| existing.has_endpoint(&link.a.device, &link.a.interface));
            if mirrored {
                warn!("skipping connection {} -> {} recorded on both ends", link.a, link.b);
                continue;
            }
            if link.a.device != link.b.device {
                place_endpoint(&mut topology, &mut link.a, &mut rng);
                place_endpoint(&mut topology, &mut link.b, &mut rng);
            }
            insert_link(&mut topology, link)?;
        }

        debug!(
            "loaded topology: {} devices, {} links",
            topology.devices.len(),
            topology.links.len()
        );
        Ok(topology)
    }

    pub fn to_json(&self) -> Result<String> {
        let devices = self
            .devices
            .iter()
            .map(|device| DeviceRecord {
                id: device.id.clone(),
                kind: device.kind,
                name: device.name.clone(),
                position: Some(device.position),
                x: None,
                y: None,
                interfaces: device.interfaces.iter().map(InterfaceRecord::from_interface).collect(),
                connections: self
                    .links()
                    .filter(|l| l.a.device == device.id)
                    .map(|l| ConnectionRecord {
                        target_id: l.b.device.clone(),
                        source_interface: l.a.interface.clone(),
                        target_interface: l.b.interface.clone(),
                        status: l.state,
                        config: l.config,
                    })
                    .collect(),
                status: device.power,
                routes: device.routes.clone(),
                firewall: device.firewall.clone(),
                configuration: device.configuration.clone(),
            })
            .collect();
        Ok(serde_json::to_string_pretty(&TopologyRecord { devices })?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Topology> {
        let text = fs::read_to_string(path)?;
        Topology::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// The old editor cabled every connection through each device's first
/// interface and wrote `""` for devices without one. Such an endpoint moves to
/// the device's next free interface, growing a new one when all are taken.
fn place_endpoint(topology: &mut Topology, end: &mut Endpoint, rng: &mut StdRng) {
    if !end.interface.is_empty() && topology.link_at(&end.device, &end.interface).is_none() {
        return;
    }
    let Some(device) = topology.device(&end.device) else {
        return;
    };
    let free = device
        .interfaces
        .iter()
        .find(|i| topology.link_at(&device.id, &i.name).is_none())
        .map(|i| i.name.clone());
    let name = match free {
        Some(name) => name,
        None => {
            let Some(device) = topology.device_mut(&end.device) else {
                return;
            };
            let prefix = match device.kind {
                DeviceKind::Hub | DeviceKind::AccessPoint => {
                    components::profile(device.kind).port_prefix
                }
                _ => "Interface",
            };
            let mut n = device.interfaces.len();
            while device.interface(&format!("{prefix}{n}")).is_some() {
                n += 1;
            }
            let name = format!("{prefix}{n}");
            device
                .interfaces
                .push(Interface::new(name.clone(), MacAddr::random(rng)));
            name
        }
    };
    warn!(
        "{}: interface {:?} is taken or unnamed, cabling {} instead",
        end.device, end.interface, name
    );
    end.interface = name;
}
