use std::net::Ipv4Addr;

use log::debug;

use crate::engine::{Outcome, Probe, Simulator};
use crate::error::Result;
use crate::forwarding::{DropReason, PacketKind};
use crate::topology::{DeviceId, Topology};

#[derive(Debug, Clone)]
pub struct EchoResult {
    pub seq: u16,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttStats {
    pub min_us: u64,
    pub avg_us: f64,
    pub max_us: u64,
    pub stddev_us: f64,
}

#[derive(Debug, Clone)]
pub struct PingReport {
    pub destination: Ipv4Addr,
    pub results: Vec<EchoResult>,
    pub elapsed_us: u64,
}

impl PingReport {
    pub fn transmitted(&self) -> usize {
        self.results.len()
    }

    pub fn received(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_echo_reply()).count()
    }

    /// `(attempts - delivered) / attempts`, as a percentage.
    pub fn loss_percent(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let lost = self.transmitted() - self.received();
        lost as f64 * 100.0 / self.transmitted() as f64
    }

    /// min/avg/max/stddev over completed round trips, `None` if none completed.
    pub fn rtt_stats(&self) -> Option<RttStats> {
        let samples: Vec<u64> = self
            .results
            .iter()
            .filter_map(|r| match r.outcome {
                Outcome::Replied {
                    kind: PacketKind::EchoReply,
                    rtt_us,
                    ..
                } => Some(rtt_us),
                _ => None,
            })
            .collect();
        let min_us = *samples.iter().min()?;
        let max_us = *samples.iter().max()?;
        let n = samples.len() as f64;
        let avg_us = samples.iter().sum::<u64>() as f64 / n;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - avg_us).powi(2))
            .sum::<f64>()
            / n;
        Some(RttStats {
            min_us,
            avg_us,
            max_us,
            stddev_us: variance.sqrt(),
        })
    }
}

/// Sends `count` independent echo requests, one interval apart on the
/// simulated clock.
pub fn ping(
    sim: &Simulator,
    topology: &Topology,
    source: &DeviceId,
    destination: Ipv4Addr,
    count: u16,
) -> Result<PingReport> {
    let first_start = sim.now_us();
    let mut last_finish = first_start;
    let mut results = Vec::with_capacity(count as usize);

    for seq in 1..=count {
        let start = sim.now_us();
        let probe = Probe::echo(destination, seq).with_ttl(sim.config().default_ttl);
        let invocation = sim.probe(topology, source, probe)?;
        last_finish = invocation.finished_at_us;
        results.push(EchoResult {
            seq,
            outcome: invocation.outcome,
        });
        if seq < count {
            sim.advance_to(start.saturating_add(crate::PING_INTERVAL_US));
        }
    }

    Ok(PingReport {
        destination,
        results,
        elapsed_us: last_finish.saturating_sub(first_start),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHop {
    pub ttl: u8,
    pub address: Option<Ipv4Addr>,
    pub device: Option<DeviceId>,
    pub rtt_us: Option<u64>,
    pub unreachable: bool,
}

#[derive(Debug, Clone)]
pub struct TracerouteReport {
    pub destination: Ipv4Addr,
    pub max_hops: u8,
    pub hops: Vec<TraceHop>,
    pub reached: bool,
}

/// One invocation per hop budget `1..=max_hops`, stopping once the
/// destination itself answers or the path is known to be unreachable.
pub fn traceroute(
    sim: &Simulator,
    topology: &Topology,
    source: &DeviceId,
    destination: Ipv4Addr,
    max_hops: u8,
) -> Result<TracerouteReport> {
    let mut hops = Vec::new();
    let mut reached = false;

    for ttl in 1..=max_hops {
        let probe = Probe::echo(destination, ttl as u16).with_ttl(ttl);
        let invocation = sim.probe(topology, source, probe)?;
        let mut hop = TraceHop {
            ttl,
            address: None,
            device: None,
            rtt_us: None,
            unreachable: false,
        };
        match invocation.outcome {
            Outcome::Replied {
                kind,
                responder,
                address,
                rtt_us,
                ..
            } => {
                hop.address = Some(address);
                hop.device = responder;
                hop.rtt_us = Some(rtt_us);
                reached = kind == PacketKind::EchoReply;
            }
            Outcome::Dropped {
                reason: DropReason::Unreachable,
                device,
            } => {
                hop.device = Some(device);
                hop.unreachable = true;
            }
            Outcome::Dropped { .. } | Outcome::TimedOut | Outcome::Abandoned => {}
        }
        let stop = reached || hop.unreachable;
        hops.push(hop);
        if stop {
            break;
        }
    }

    debug!("traceroute to {destination}: {} hops, reached={reached}", hops.len());
    Ok(TracerouteReport {
        destination,
        max_hops,
        hops,
        reached,
    })
}
