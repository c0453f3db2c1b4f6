pub mod addr;
pub mod components;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod firewall;
pub mod forwarding;
pub mod mac_table;
pub mod persist;
pub mod resolver;
pub mod routing;
pub mod store;
pub mod terminal;
pub mod topology;

pub use addr::MacAddr;
pub use components::Profile;
pub use diagnostics::{ping, traceroute, PingReport, TracerouteReport};
pub use engine::{
    CancelToken, EventKind, Invocation, Outcome, Probe, SimulationEvent, Simulator, SimulatorConfig,
};
pub use error::{NetError, Result};
pub use firewall::{FirewallPolicy, FirewallRule, RuleAction, Subnet};
pub use forwarding::{DropReason, LinkFault, Packet, PacketKind};
pub use resolver::{resolve_hardware, resolve_next_hop, same_network, NextHop};
pub use routing::{RoutingTable, StaticRoute};
pub use store::TopologyStore;
pub use terminal::{CommandError, Terminal};
pub use topology::{
    Device, DeviceId, DeviceKind, Endpoint, Interface, Link, LinkConfig, LinkState, Position,
    PowerState, Topology,
};

/// Simulated time constants (in Microseconds)
pub const DEFAULT_LINK_LATENCY_US: u64 = 1_000; // 1ms per traversal
pub const DEFAULT_TIMEOUT_US: u64 = 2_000_000; // 2s per invocation
pub const MAC_AGING_US: u64 = 300_000_000; // 300s
pub const PING_INTERVAL_US: u64 = 1_000_000; // 1s between echoes

pub const DEFAULT_TTL: u8 = 64;
pub const PING_COUNT: u16 = 4;
pub const TRACEROUTE_MAX_HOPS: u8 = 30;
