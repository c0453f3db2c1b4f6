use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::MacAddr;
use crate::mac_table::MacTables;
use crate::resolver::{resolve_hardware, resolve_next_hop};
use crate::topology::{Device, DeviceId, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    EchoRequest,
    EchoReply,
    TimeExceeded,
}

/// The layer-3 payload carried through the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub kind: PacketKind,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub seq: u16,
    pub port: Option<u16>,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} -> {} seq={} ttl={}",
            self.kind, self.source, self.destination, self.seq, self.ttl
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub packet: Packet,
}

/// Why a link-level drop happened. Loss is kept apart from administrative
/// and power faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFault {
    AdminDown,
    PoweredOff,
    NotConnected,
    Loss,
    SamePort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    Ttl,
    Unreachable,
    LinkDown(LinkFault),
    Policy,
}

/// What a device does with one frame that arrived on one interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The packet is addressed to this device.
    Deliver,
    /// Not for this device and not forwarded (e.g. a host seeing flooded traffic).
    Ignore,
    Unicast { egress: String, frame: Frame },
    Flood { egress: Vec<String> },
    /// TTL ran out here; the device answers with a time-exceeded message.
    Expire,
    Drop(DropReason),
}

/// Read access to the snapshot plus the shared learning state a device may
/// touch while deciding.
pub struct ForwardContext<'a> {
    pub topology: &'a Topology,
    pub mac_tables: &'a MacTables,
    pub now_us: u64,
}

impl ForwardContext<'_> {
    /// Every interface of `device` except `ingress` that has a cable attached.
    pub fn linked_ports_except(&self, device: &Device, ingress: &str) -> Vec<String> {
        device
            .interfaces
            .iter()
            .filter(|i| i.name != ingress)
            .filter(|i| self.topology.link_at(&device.id, &i.name).is_some())
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn learn(&self, device: &DeviceId, mac: MacAddr, interface: &str) {
        let Some(peer) = self.topology.peer(device, interface) else {
            return;
        };
        let now = self.now_us;
        self.mac_tables
            .with_table(device, |table| table.learn(mac, interface, peer, now));
    }

    pub fn lookup(&self, device: &DeviceId, mac: MacAddr) -> Option<String> {
        let now = self.now_us;
        self.mac_tables
            .with_table(device, |table| table.lookup(mac, now).map(str::to_string))
    }
}

/// Picks the egress interface and addresses a frame for `packet` leaving
/// `device`. Used both when a device originates traffic and when a router
/// forwards it.
pub fn route_packet(
    topology: &Topology,
    device: &Device,
    packet: Packet,
) -> Result<(String, Frame), DropReason> {
    let hop = resolve_next_hop(topology, &device.id, packet.destination)
        .map_err(|_| DropReason::Unreachable)?;
    let dst_mac = resolve_hardware(topology, hop.target(packet.destination))
        .ok_or(DropReason::Unreachable)?;
    let src_mac = device
        .interface(&hop.interface)
        .map(|i| i.mac)
        .ok_or(DropReason::Unreachable)?;
    Ok((
        hop.interface,
        Frame {
            src_mac,
            dst_mac,
            packet,
        },
    ))
}

/// Whether a layer-3 device accepts `frame` off `ingress` at all.
pub fn addressed_to(device: &Device, ingress: &str, frame: &Frame) -> bool {
    frame.dst_mac.is_broadcast()
        || device
            .interface(ingress)
            .map_or(false, |i| i.mac == frame.dst_mac)
}
