use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, trace};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components;
use crate::error::{NetError, Result};
use crate::forwarding::{
    route_packet, Action, DropReason, ForwardContext, Frame, LinkFault, Packet, PacketKind,
};
use crate::mac_table::{MacTable, MacTables};
use crate::resolver::resolve_next_hop;
use crate::topology::{Device, DeviceId, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Sent,
    Forwarded,
    Flooded,
    DroppedTtl,
    DroppedUnreachable,
    DroppedLinkDown(LinkFault),
    DroppedByPolicy,
    Delivered,
    Timeout,
}

impl EventKind {
    pub fn dropped(reason: DropReason) -> Self {
        match reason {
            DropReason::Ttl => EventKind::DroppedTtl,
            DropReason::Unreachable => EventKind::DroppedUnreachable,
            DropReason::LinkDown(fault) => EventKind::DroppedLinkDown(fault),
            DropReason::Policy => EventKind::DroppedByPolicy,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            EventKind::DroppedTtl
                | EventKind::DroppedUnreachable
                | EventKind::DroppedLinkDown(_)
                | EventKind::DroppedByPolicy
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EventKind::Sent => "sent",
            EventKind::Forwarded => "forwarded",
            EventKind::Flooded => "flooded",
            EventKind::DroppedTtl => "dropped-ttl",
            EventKind::DroppedUnreachable => "dropped-unreachable",
            EventKind::DroppedLinkDown(LinkFault::Loss) => "dropped-link-down (lost)",
            EventKind::DroppedLinkDown(_) => "dropped-link-down",
            EventKind::DroppedByPolicy => "dropped-by-policy",
            EventKind::Delivered => "delivered",
            EventKind::Timeout => "timeout",
        };
        f.write_str(text)
    }
}

/// One entry of an invocation's trace. Produced only by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub time_us: u64,
    pub kind: EventKind,
    pub device: DeviceId,
    pub interface: Option<String>,
    pub payload: Packet,
}

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An echo reply or time-exceeded message made it back to the origin.
    Replied {
        kind: PacketKind,
        responder: Option<DeviceId>,
        address: Ipv4Addr,
        rtt_us: u64,
        ttl: u8,
    },
    Dropped {
        reason: DropReason,
        device: DeviceId,
    },
    TimedOut,
    Abandoned,
}

impl Outcome {
    pub fn is_echo_reply(&self) -> bool {
        matches!(self, Outcome::Replied { kind: PacketKind::EchoReply, .. })
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub trace: Vec<SimulationEvent>,
    pub outcome: Outcome,
    pub started_at_us: u64,
    pub finished_at_us: u64,
}

impl Invocation {
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &SimulationEvent> {
        self.trace.iter().filter(move |e| e.kind == kind)
    }
}

/// What one echo invocation sends.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub seq: u16,
    pub port: Option<u16>,
}

impl Probe {
    pub fn echo(destination: Ipv4Addr, seq: u16) -> Self {
        Self {
            destination,
            ttl: crate::DEFAULT_TTL,
            seq,
            port: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub timeout_us: u64,
    pub default_ttl: u8,
    pub mac_aging_us: u64,
    pub max_steps: usize,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            timeout_us: crate::DEFAULT_TIMEOUT_US,
            default_ttl: crate::DEFAULT_TTL,
            mac_aging_us: crate::MAC_AGING_US,
            max_steps: 4096,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = timeout_us;
        self
    }

    pub fn with_mac_aging_us(mut self, mac_aging_us: u64) -> Self {
        self.mac_aging_us = mac_aging_us;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Lets a caller abandon an in-flight invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One frame in flight, due at `(device, ingress)` at `time_us`.
#[derive(Debug, Clone)]
struct Transit {
    time_us: u64,
    seq: u64,
    device: DeviceId,
    ingress: String,
    frame: Frame,
}

impl PartialEq for Transit {
    fn eq(&self, other: &Self) -> bool {
        (self.time_us, self.seq) == (other.time_us, other.seq)
    }
}
impl Eq for Transit {}
impl PartialOrd for Transit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Transit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time_us, self.seq).cmp(&(other.time_us, other.seq))
    }
}

/// Discrete-event core. Shared by every terminal of one topology: the clock
/// and the switch tables live here, everything else comes from the snapshot
/// handed to each invocation.
pub struct Simulator {
    config: SimulatorConfig,
    clock_us: AtomicU64,
    mac_tables: MacTables,
    rng: Mutex<StdRng>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            mac_tables: MacTables::new(config.mac_aging_us),
            clock_us: AtomicU64::new(0),
            rng: Mutex::new(rng),
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn now_us(&self) -> u64 {
        self.clock_us.load(Ordering::SeqCst)
    }

    /// Moves the simulated clock forward, e.g. to let learned entries age.
    pub fn advance(&self, delta_us: u64) {
        let _ = self
            .clock_us
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta_us))
            });
    }

    /// Moves the clock to `time_us` unless it is already past it.
    pub fn advance_to(&self, time_us: u64) {
        self.clock_us.fetch_max(time_us, Ordering::SeqCst);
    }

    pub fn mac_table(&self, switch: &DeviceId) -> Option<MacTable> {
        self.mac_tables.snapshot(switch)
    }

    /// Drops learned state that `topology` no longer backs: tables of removed
    /// devices and entries on ports that were unplugged or re-cabled.
    pub fn sync_tables(&self, topology: &Topology) {
        self.mac_tables.prune(topology, self.now_us());
    }

    pub fn probe(
        &self,
        topology: &Topology,
        source: &DeviceId,
        probe: Probe,
    ) -> Result<Invocation> {
        self.probe_cancellable(topology, source, probe, &CancelToken::default())
    }

    /// Runs one echo invocation from `source` to completion, timeout or
    /// cancellation. Learned switch entries stay in place either way.
    pub fn probe_cancellable(
        &self,
        topology: &Topology,
        source: &DeviceId,
        probe: Probe,
        cancel: &CancelToken,
    ) -> Result<Invocation> {
        let origin = topology
            .device(source)
            .ok_or_else(|| NetError::UnknownDevice(source.clone()))?;
        let rng = {
            let mut master = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            StdRng::seed_from_u64(master.gen())
        };
        self.sync_tables(topology);
        let start = self.now_us();
        debug!(
            "{}: probe {} seq={} ttl={} at {}us",
            origin.name, probe.destination, probe.seq, probe.ttl, start
        );

        let mut walk = Walk {
            sim: self,
            topology,
            rng,
            queue: BinaryHeap::new(),
            trace: Vec::new(),
            next_seq: 0,
            origin: origin.id.clone(),
            origin_ip: Ipv4Addr::UNSPECIFIED,
            request: None,
            start,
            deadline: start.saturating_add(self.config.timeout_us),
            last_drop: None,
        };
        let (outcome, finished) = walk.run(origin, probe, cancel);
        self.clock_us.fetch_max(finished, Ordering::SeqCst);

        info!(
            "{}: probe {} seq={} -> {:?}",
            origin.name, probe.destination, probe.seq, outcome
        );
        Ok(Invocation {
            trace: walk.trace,
            outcome,
            started_at_us: start,
            finished_at_us: finished,
        })
    }
}

struct Walk<'a> {
    sim: &'a Simulator,
    topology: &'a Topology,
    rng: StdRng,
    queue: BinaryHeap<Reverse<Transit>>,
    trace: Vec<SimulationEvent>,
    next_seq: u64,
    origin: DeviceId,
    origin_ip: Ipv4Addr,
    request: Option<Packet>,
    start: u64,
    deadline: u64,
    last_drop: Option<(DropReason, DeviceId)>,
}

impl Walk<'_> {
    fn run(&mut self, origin: &Device, probe: Probe, cancel: &CancelToken) -> (Outcome, u64) {
        let mut request = Packet {
            kind: PacketKind::EchoRequest,
            source: origin
                .addressed_interfaces()
                .next()
                .map_or(Ipv4Addr::UNSPECIFIED, |(_, ip, _)| ip),
            destination: probe.destination,
            ttl: probe.ttl,
            seq: probe.seq,
            port: probe.port,
        };

        if !origin.is_on() {
            let reason = DropReason::LinkDown(LinkFault::PoweredOff);
            self.drop_at(origin, None, request, reason, self.start);
            return self.settle(self.start);
        }

        if let Some(iface) = origin.interface_with_ip(probe.destination) {
            request.source = probe.destination;
            self.record(self.start, EventKind::Delivered, &origin.id, Some(&iface.name), request);
            let outcome = Outcome::Replied {
                kind: PacketKind::EchoReply,
                responder: Some(origin.id.clone()),
                address: probe.destination,
                rtt_us: 0,
                ttl: probe.ttl,
            };
            return (outcome, self.start);
        }

        if let Ok(hop) = resolve_next_hop(self.topology, &origin.id, probe.destination) {
            if let Some(ip) = origin.interface(&hop.interface).and_then(|i| i.ip) {
                request.source = ip;
            }
        }
        self.origin_ip = request.source;
        self.request = Some(request);
        self.originate(origin, request, self.start);

        let mut steps = 0usize;
        while let Some(Reverse(transit)) = self.queue.pop() {
            if cancel.is_cancelled() {
                debug!("{}: invocation abandoned at {}us", self.origin, transit.time_us);
                return (Outcome::Abandoned, transit.time_us);
            }
            steps += 1;
            if steps > self.sim.config.max_steps || transit.time_us > self.deadline {
                return self.time_out();
            }
            let topology = self.topology;
            let Some(device) = topology.device(&transit.device) else {
                continue;
            };
            if let Some(outcome) = self.step(device, transit) {
                return outcome;
            }
        }
        self.settle(self.start)
    }

    /// Lets `device` act on one arriving frame.
    fn step(&mut self, device: &Device, transit: Transit) -> Option<(Outcome, u64)> {
        let now = transit.time_us;
        let packet = transit.frame.packet;
        trace!("{}us {} <- {} on {}", now, device.name, packet, transit.ingress);

        let ctx = ForwardContext {
            topology: self.topology,
            mac_tables: &self.sim.mac_tables,
            now_us: now,
        };
        match components::forward(&ctx, device, &transit.ingress, &transit.frame) {
            Action::Deliver => {
                self.record(now, EventKind::Delivered, &device.id, Some(&transit.ingress), packet);
                return self.deliver(device, packet, now);
            }
            Action::Ignore => {}
            Action::Unicast { egress, frame } => {
                self.transmit(device, &egress, frame, now, EventKind::Forwarded);
            }
            Action::Flood { egress } => {
                self.record(now, EventKind::Flooded, &device.id, Some(&transit.ingress), packet);
                for port in egress {
                    self.put_on_wire(device, &port, transit.frame, now, true);
                }
            }
            Action::Expire => {
                self.drop_at(device, Some(&transit.ingress), packet, DropReason::Ttl, now);
                if packet.kind == PacketKind::EchoRequest {
                    let reporter = device
                        .interface(&transit.ingress)
                        .and_then(|i| i.ip)
                        .or_else(|| device.addressed_interfaces().next().map(|(_, ip, _)| ip));
                    if let Some(reporter) = reporter {
                        let notice = Packet {
                            kind: PacketKind::TimeExceeded,
                            source: reporter,
                            destination: packet.source,
                            ttl: self.sim.config.default_ttl,
                            seq: packet.seq,
                            port: None,
                        };
                        self.originate(device, notice, now);
                    }
                }
            }
            Action::Drop(reason) => {
                self.drop_at(device, Some(&transit.ingress), packet, reason, now);
            }
        }
        None
    }

    /// A packet reached the device it was addressed to.
    fn deliver(&mut self, device: &Device, packet: Packet, now: u64) -> Option<(Outcome, u64)> {
        match packet.kind {
            PacketKind::EchoRequest => {
                let reply = Packet {
                    kind: PacketKind::EchoReply,
                    source: packet.destination,
                    destination: packet.source,
                    ttl: self.sim.config.default_ttl,
                    seq: packet.seq,
                    port: packet.port,
                };
                self.originate(device, reply, now);
                None
            }
            PacketKind::EchoReply | PacketKind::TimeExceeded => {
                if device.id != self.origin || packet.destination != self.origin_ip {
                    return None;
                }
                let outcome = Outcome::Replied {
                    kind: packet.kind,
                    responder: self
                        .topology
                        .owner_of_ip(packet.source)
                        .map(|(d, _)| d.id.clone()),
                    address: packet.source,
                    rtt_us: now - self.start,
                    ttl: packet.ttl,
                };
                Some((outcome, now))
            }
        }
    }

    /// Sends a packet the device itself generated.
    fn originate(&mut self, device: &Device, packet: Packet, now: u64) {
        if !device.is_on() {
            self.drop_at(device, None, packet, DropReason::LinkDown(LinkFault::PoweredOff), now);
            return;
        }
        match route_packet(self.topology, device, packet) {
            Ok((egress, frame)) => self.transmit(device, &egress, frame, now, EventKind::Sent),
            Err(reason) => self.drop_at(device, None, packet, reason, now),
        }
    }

    fn transmit(&mut self, device: &Device, egress: &str, frame: Frame, now: u64, kind: EventKind) {
        let fault = match self.topology.link_at(&device.id, egress) {
            Some(link) if link.is_up() => None,
            Some(_) => Some(LinkFault::AdminDown),
            None => Some(LinkFault::NotConnected),
        };
        if let Some(fault) = fault {
            self.drop_at(device, Some(egress), frame.packet, DropReason::LinkDown(fault), now);
            return;
        }
        self.record(now, kind, &device.id, Some(egress), frame.packet);
        self.put_on_wire(device, egress, frame, now, false);
    }

    /// Carries a frame across the link at `(device, egress)`. Flooded copies
    /// skip dead ports silently; every traversal may be lost.
    fn put_on_wire(
        &mut self,
        device: &Device,
        egress: &str,
        frame: Frame,
        now: u64,
        flooding: bool,
    ) {
        let Some(link) = self.topology.link_at(&device.id, egress) else {
            return;
        };
        if flooding && !link.is_up() {
            return;
        }
        let Some(peer) = link.peer_of(&device.id, egress) else {
            return;
        };
        let config = link.config;

        if config.loss_rate > 0.0 && self.rng.gen::<f32>() < config.loss_rate {
            let reason = DropReason::LinkDown(LinkFault::Loss);
            self.drop_at(device, Some(egress), frame.packet, reason, now);
            return;
        }
        let jitter = if config.jitter_us > 0 {
            self.rng.gen_range(0..=config.jitter_us)
        } else {
            0
        };
        let transit = Transit {
            time_us: now.saturating_add(config.latency_us).saturating_add(jitter),
            seq: self.next_seq,
            device: peer.device.clone(),
            ingress: peer.interface.clone(),
            frame,
        };
        self.next_seq += 1;
        self.queue.push(Reverse(transit));
    }

    fn record(
        &mut self,
        time_us: u64,
        kind: EventKind,
        device: &DeviceId,
        interface: Option<&str>,
        payload: Packet,
    ) {
        self.trace.push(SimulationEvent {
            time_us,
            kind,
            device: device.clone(),
            interface: interface.map(str::to_string),
            payload,
        });
    }

    fn drop_at(
        &mut self,
        device: &Device,
        interface: Option<&str>,
        packet: Packet,
        reason: DropReason,
        now: u64,
    ) {
        trace!("{}us {} drops {} ({:?})", now, device.name, packet, reason);
        self.record(now, EventKind::dropped(reason), &device.id, interface, packet);
        self.last_drop = Some((reason, device.id.clone()));
    }

    /// Nothing is left in flight: report the latest drop, or a timeout when
    /// the traffic simply went nowhere.
    fn settle(&mut self, now: u64) -> (Outcome, u64) {
        match self.last_drop.take() {
            Some((reason, device)) => {
                let finished = now.max(self.last_event_time());
                (Outcome::Dropped { reason, device }, finished)
            }
            None => self.time_out(),
        }
    }

    fn time_out(&mut self) -> (Outcome, u64) {
        let payload = self.request.unwrap_or(Packet {
            kind: PacketKind::EchoRequest,
            source: self.origin_ip,
            destination: Ipv4Addr::UNSPECIFIED,
            ttl: 0,
            seq: 0,
            port: None,
        });
        let origin = self.origin.clone();
        self.record(self.deadline, EventKind::Timeout, &origin, None, payload);
        (Outcome::TimedOut, self.deadline)
    }

    fn last_event_time(&self) -> u64 {
        self.trace.last().map_or(self.start, |e| e.time_us)
    }
}
