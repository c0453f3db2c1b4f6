use std::net::Ipv4Addr;

use thiserror::Error;

use crate::topology::{DeviceId, DeviceKind};

/// Structural and resolution failures raised by the topology store and the
/// address resolver. A failed mutation never changes the published snapshot.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("interface {interface} on {device} is already linked")]
    InterfaceBusy { device: DeviceId, interface: String },

    #[error("cannot connect {0} to itself")]
    SelfConnection(DeviceId),

    #[error("duplicate device id: {0}")]
    DuplicateDevice(DeviceId),

    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("unknown interface {interface} on {device}")]
    UnknownInterface { device: DeviceId, interface: String },

    #[error("{device} ({kind}) does not carry layer-3 configuration")]
    NotAddressable { device: DeviceId, kind: DeviceKind },

    #[error("interface {interface} on {device} is used by a link")]
    InterfaceInUse { device: DeviceId, interface: String },

    #[error("interface {interface} on {device} has no link")]
    NotConnected { device: DeviceId, interface: String },

    #[error("invalid link configuration: {0}")]
    InvalidLinkConfig(String),

    #[error("route {prefix}/{mask} via {next_hop} already exists on {device}")]
    DuplicateRoute {
        device: DeviceId,
        prefix: Ipv4Addr,
        mask: Ipv4Addr,
        next_hop: Ipv4Addr,
    },

    #[error("no route to {0}")]
    Unreachable(Ipv4Addr),

    #[error("malformed topology file: {0}")]
    Persist(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
