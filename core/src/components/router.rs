use crate::forwarding::{addressed_to, route_packet, Action, ForwardContext, Frame};
use crate::topology::Device;

use super::Profile;

pub const PROFILE: Profile = Profile {
    label: "Router",
    port_prefix: "GigabitEthernet0/",
    port_count: 1,
};

pub fn forward(ctx: &ForwardContext<'_>, device: &Device, ingress: &str, frame: &Frame) -> Action {
    if !addressed_to(device, ingress, frame) {
        return Action::Ignore;
    }
    if device.interface_with_ip(frame.packet.destination).is_some() {
        return Action::Deliver;
    }
    route(ctx, device, frame)
}

/// Decrements TTL and re-addresses the frame toward its next hop.
pub(crate) fn route(ctx: &ForwardContext<'_>, device: &Device, frame: &Frame) -> Action {
    if frame.packet.ttl <= 1 {
        return Action::Expire;
    }
    let mut packet = frame.packet;
    packet.ttl -= 1;

    match route_packet(ctx.topology, device, packet) {
        Ok((egress, frame)) => Action::Unicast { egress, frame },
        Err(reason) => Action::Drop(reason),
    }
}
