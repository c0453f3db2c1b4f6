use std::net::Ipv4Addr;

use crate::addr::{in_subnet, parse_ipv4, MacAddr};
use crate::error::{NetError, Result};
use crate::routing::RoutingTable;
use crate::topology::{DeviceId, Topology};

/// `(a & mask) == (b & mask)` over the dotted-quad parse of each operand.
pub fn same_network(a: &str, b: &str, mask: &str) -> Result<bool> {
    let (a, b, mask) = (parse_ipv4(a)?, parse_ipv4(b)?, parse_ipv4(mask)?);
    Ok(in_subnet(a, b, mask))
}

/// Where a device sends traffic for some destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub interface: String,
    /// `None` when the destination sits on a directly-connected subnet.
    pub next_hop: Option<Ipv4Addr>,
}

impl NextHop {
    /// The address whose hardware address the outgoing frame is sent to.
    pub fn target(&self, destination: Ipv4Addr) -> Ipv4Addr {
        self.next_hop.unwrap_or(destination)
    }
}

/// Directly-connected subnets win; otherwise hosts fall back to their gateway
/// and routers to a longest-prefix match over their routing table.
pub fn resolve_next_hop(
    topology: &Topology,
    source: &DeviceId,
    destination: Ipv4Addr,
) -> Result<NextHop> {
    let device = topology
        .device(source)
        .ok_or_else(|| NetError::UnknownDevice(source.clone()))?;
    if !device.kind.is_addressable() {
        return Err(NetError::Unreachable(destination));
    }

    if let Some((iface, _, _)) = device
        .addressed_interfaces()
        .find(|(_, ip, mask)| in_subnet(*ip, destination, *mask))
    {
        return Ok(NextHop {
            interface: iface.name.clone(),
            next_hop: None,
        });
    }

    RoutingTable::for_device(device)
        .lookup(destination)
        .map(|entry| NextHop {
            interface: entry.interface.clone(),
            next_hop: entry.next_hop,
        })
        .ok_or(NetError::Unreachable(destination))
}

/// Hardware address of whichever interface in the snapshot holds `ip`.
pub fn resolve_hardware(topology: &Topology, ip: Ipv4Addr) -> Option<MacAddr> {
    topology.owner_of_ip(ip).map(|(_, iface)| iface.mac)
}
