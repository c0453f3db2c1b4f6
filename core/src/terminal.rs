//! The per-device command interpreter. Maps a typed line onto the simulator
//! and renders the result as terminal lines; it never mutates the topology.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::addr::parse_ipv4;
use crate::diagnostics::{ping, traceroute, PingReport, TracerouteReport};
use crate::engine::{Outcome, Simulator};
use crate::error::NetError;
use crate::forwarding::{DropReason, PacketKind};
use crate::routing::{RouteOrigin, RoutingTable};
use crate::topology::{Device, DeviceId, Topology};

const PING_USAGE: &str = "ping <ip> [count]";
const TRACEROUTE_USAGE: &str = "traceroute <ip> [max-hops]";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Command not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Net(#[from] NetError),
}

impl CommandError {
    pub fn lines(&self) -> Vec<String> {
        match self {
            CommandError::NotFound(_) => vec![
                self.to_string(),
                "Type \"help\" for available commands.".to_string(),
                String::new(),
            ],
            _ => vec![self.to_string(), String::new()],
        }
    }
}

/// A terminal bound to one device.
#[derive(Debug, Clone)]
pub struct Terminal {
    device: DeviceId,
}

impl Terminal {
    pub fn new(device: DeviceId) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn banner(&self, topology: &Topology) -> Vec<String> {
        let name = topology
            .device(&self.device)
            .map_or(self.device.as_str(), |d| d.name.as_str());
        vec![
            "Network Simulator Terminal v1.0".to_string(),
            format!("Device: {name}"),
            "Type 'help' for available commands.".to_string(),
            String::new(),
        ]
    }

    /// Like [`Terminal::execute`], with failures rendered as lines too.
    pub fn run(&self, sim: &Simulator, topology: &Topology, line: &str) -> Vec<String> {
        self.execute(sim, topology, line)
            .unwrap_or_else(|err| err.lines())
    }

    pub fn execute(
        &self,
        sim: &Simulator,
        topology: &Topology,
        line: &str,
    ) -> Result<Vec<String>, CommandError> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = parts.collect();
        let device = topology
            .device(&self.device)
            .ok_or_else(|| NetError::UnknownDevice(self.device.clone()))?;

        match verb.to_ascii_lowercase().as_str() {
            "help" => Ok(help()),
            "ipconfig" => Ok(ipconfig(topology, device)),
            "netstat" => Ok(netstat(topology, device)),
            "route" => Ok(route(device)),
            "mactable" => Ok(mactable(sim, topology, device)),
            "ping" => {
                let destination = required_ip(&args, PING_USAGE)?;
                let count = optional_number(&args, PING_USAGE, crate::PING_COUNT)?;
                let report = ping(sim, topology, &device.id, destination, count)?;
                Ok(render_ping(topology, &report))
            }
            "traceroute" => {
                let destination = required_ip(&args, TRACEROUTE_USAGE)?;
                let max_hops =
                    optional_number(&args, TRACEROUTE_USAGE, crate::TRACEROUTE_MAX_HOPS)?;
                let report = traceroute(sim, topology, &device.id, destination, max_hops)?;
                Ok(render_traceroute(&report))
            }
            _ => Err(CommandError::NotFound(verb.to_string())),
        }
    }
}

fn required_ip(args: &[&str], usage: &'static str) -> Result<Ipv4Addr, CommandError> {
    let text = args.first().ok_or(CommandError::Usage(usage))?;
    Ok(parse_ipv4(text)?)
}

fn optional_number<T: std::str::FromStr + PartialOrd + Default>(
    args: &[&str],
    usage: &'static str,
    default: T,
) -> Result<T, CommandError> {
    match args.get(1) {
        None => Ok(default),
        Some(text) => match text.parse::<T>() {
            Ok(n) if n > T::default() => Ok(n),
            _ => Err(CommandError::Usage(usage)),
        },
    }
}

fn help() -> Vec<String> {
    [
        "Available commands:",
        "  help                    - Show this help message",
        "  ipconfig                - Display network interfaces",
        "  ping <ip> [count]       - Send echo requests to an IP address",
        "  traceroute <ip> [hops]  - Trace the route to an IP address",
        "  netstat                 - Display links of this device",
        "  route                   - Display routing table",
        "  mactable                - Display learned MAC addresses (switches)",
        "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn ipconfig(topology: &Topology, device: &Device) -> Vec<String> {
    let mut out = Vec::new();
    for iface in &device.interfaces {
        let running = device.is_on()
            && topology
                .link_at(&device.id, &iface.name)
                .map_or(false, |l| l.is_up());
        if running {
            out.push(format!(
                "{}: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500",
                iface.name
            ));
        } else {
            out.push(format!("{}: flags=4098<BROADCAST,MULTICAST>  mtu 1500", iface.name));
        }
        if let Some((ip, mask)) = iface.address() {
            out.push(format!("        inet {ip}  netmask {mask}"));
        }
        if let Some(gateway) = iface.gateway {
            out.push(format!("        gateway {gateway}"));
        }
        out.push(format!("        ether {}  txqueuelen 1000  (Ethernet)", iface.mac));
        out.push(String::new());
    }
    if device.interfaces.is_empty() {
        out.push("No network interfaces found.".to_string());
        out.push(String::new());
    }
    out
}

fn netstat(topology: &Topology, device: &Device) -> Vec<String> {
    let mut out = vec![
        format!("Links of {}", device.name),
        format!("{:<22}{:<34}{:<7}{}", "Interface", "Peer", "State", "Latency"),
    ];
    for iface in &device.interfaces {
        match topology.link_at(&device.id, &iface.name) {
            Some(link) => {
                let peer = link
                    .peer_of(&device.id, &iface.name)
                    .map(|p| {
                        let name = topology
                            .device(&p.device)
                            .map_or(p.device.as_str(), |d| d.name.as_str());
                        format!("{}:{}", name, p.interface)
                    })
                    .unwrap_or_default();
                out.push(format!(
                    "{:<22}{:<34}{:<7}{:.3} ms",
                    iface.name,
                    peer,
                    link.state.to_string().to_uppercase(),
                    link.config.latency_us as f64 / 1000.0
                ));
            }
            None => out.push(format!("{:<22}{:<34}{:<7}", iface.name, "-", "FREE")),
        }
    }
    out.push(String::new());
    out
}

fn route(device: &Device) -> Vec<String> {
    let mut out = vec![
        "Kernel IP routing table".to_string(),
        "Destination     Gateway         Genmask         Flags Metric Ref    Use Iface".to_string(),
    ];
    if !device.kind.is_addressable() {
        out.push(format!("(no routing table on a {})", device.kind));
    }
    for entry in RoutingTable::for_device(device).entries {
        let flags = match entry.origin {
            RouteOrigin::Connected => "U",
            RouteOrigin::Static | RouteOrigin::Gateway => "UG",
        };
        out.push(format!(
            "{:<16}{:<16}{:<16}{:<6}{:<7}{:<7}{:>3} {}",
            entry.destination.to_string(),
            entry.next_hop.unwrap_or(Ipv4Addr::UNSPECIFIED).to_string(),
            entry.mask.to_string(),
            flags,
            entry.metric,
            0,
            0,
            entry.interface
        ));
    }
    out.push(String::new());
    out
}

fn mactable(sim: &Simulator, topology: &Topology, device: &Device) -> Vec<String> {
    if !device.kind.learns() {
        return vec![
            format!("mactable: {} does not learn addresses", device.name),
            String::new(),
        ];
    }
    sim.sync_tables(topology);
    let now = sim.now_us();
    let mut out = vec![
        "          Mac Address Table".to_string(),
        format!("{:<20}{:<10}{:<20}{}", "Mac Address", "Type", "Port", "Age(s)"),
    ];
    let entries = sim.mac_table(&device.id).map(|t| t.entries(now)).unwrap_or_default();
    for (mac, entry) in &entries {
        out.push(format!(
            "{:<20}{:<10}{:<20}{}",
            mac.to_string(),
            "DYNAMIC",
            entry.interface,
            now.saturating_sub(entry.last_seen_us) / 1_000_000
        ));
    }
    out.push(format!("Total Mac Addresses: {}", entries.len()));
    out.push(String::new());
    out
}

fn ms(us: f64) -> String {
    format!("{:.3}", us / 1000.0)
}

fn device_address(topology: &Topology, id: &DeviceId) -> String {
    topology
        .device(id)
        .and_then(|d| d.addressed_interfaces().next().map(|(_, ip, _)| ip.to_string()))
        .unwrap_or_else(|| id.to_string())
}

fn render_ping(topology: &Topology, report: &PingReport) -> Vec<String> {
    let dst = report.destination;
    let mut out = vec![format!("PING {dst} ({dst}) 56(84) bytes of data.")];
    for result in &report.results {
        let seq = result.seq;
        out.push(match &result.outcome {
            Outcome::Replied {
                kind: PacketKind::EchoReply,
                address,
                rtt_us,
                ttl,
                ..
            } => format!(
                "64 bytes from {address}: icmp_seq={seq} ttl={ttl} time={} ms",
                ms(*rtt_us as f64)
            ),
            Outcome::Replied { address, .. } => {
                format!("From {address} icmp_seq={seq} Time to live exceeded")
            }
            Outcome::Dropped {
                reason: DropReason::Unreachable,
                device,
            } => format!(
                "From {} icmp_seq={seq} Destination Host Unreachable",
                device_address(topology, device)
            ),
            Outcome::Dropped { .. } | Outcome::TimedOut | Outcome::Abandoned => {
                format!("Request timeout for icmp_seq {seq}")
            }
        });
    }
    out.push(String::new());
    out.push(format!("--- {dst} ping statistics ---"));
    out.push(format!(
        "{} packets transmitted, {} received, {:.0}% packet loss, time {}ms",
        report.transmitted(),
        report.received(),
        report.loss_percent(),
        report.elapsed_us / 1000
    ));
    if let Some(stats) = report.rtt_stats() {
        out.push(format!(
            "rtt min/avg/max/mdev = {}/{}/{}/{} ms",
            ms(stats.min_us as f64),
            ms(stats.avg_us),
            ms(stats.max_us as f64),
            ms(stats.stddev_us)
        ));
    }
    out.push(String::new());
    out
}

fn render_traceroute(report: &TracerouteReport) -> Vec<String> {
    let dst = report.destination;
    let mut out = vec![format!(
        "traceroute to {dst} ({dst}), {} hops max, 60 byte packets",
        report.max_hops
    )];
    for hop in &report.hops {
        out.push(match (hop.address, hop.rtt_us) {
            (Some(address), Some(rtt)) => {
                format!("{:>2}  {address}  {} ms", hop.ttl, ms(rtt as f64))
            }
            _ if hop.unreachable => format!("{:>2}  !N", hop.ttl),
            _ => format!("{:>2}  *", hop.ttl),
        });
    }
    out.push(String::new());
    out
}
