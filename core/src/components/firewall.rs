use log::debug;

use crate::forwarding::{addressed_to, Action, DropReason, ForwardContext, Frame};
use crate::topology::Device;

use super::{router, Profile};

pub const PROFILE: Profile = Profile {
    label: "Firewall",
    port_prefix: "GigabitEthernet0/",
    port_count: 2,
};

/// Routes like a router, but only transit traffic the policy permits.
pub fn forward(ctx: &ForwardContext<'_>, device: &Device, ingress: &str, frame: &Frame) -> Action {
    if !addressed_to(device, ingress, frame) {
        return Action::Ignore;
    }
    let packet = &frame.packet;
    if device.interface_with_ip(packet.destination).is_some() {
        return Action::Deliver;
    }
    if !device
        .firewall
        .permits(packet.source, packet.destination, packet.port)
    {
        debug!("{}: policy denies {}", device.name, packet);
        return Action::Drop(DropReason::Policy);
    }
    router::route(ctx, device, frame)
}
