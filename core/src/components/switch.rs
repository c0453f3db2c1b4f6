use log::trace;

use crate::forwarding::{Action, DropReason, ForwardContext, Frame, LinkFault};
use crate::topology::Device;

use super::Profile;

pub const PROFILE: Profile = Profile {
    label: "Switch",
    port_prefix: "FastEthernet0/",
    port_count: 8,
};

pub fn forward(ctx: &ForwardContext<'_>, device: &Device, ingress: &str, frame: &Frame) -> Action {
    ctx.learn(&device.id, frame.src_mac, ingress);

    if frame.dst_mac.is_broadcast() {
        return Action::Flood {
            egress: ctx.linked_ports_except(device, ingress),
        };
    }

    match ctx.lookup(&device.id, frame.dst_mac) {
        Some(port) if port == ingress => {
            trace!(
                "{}: {} lives behind ingress {}, filtering",
                device.name,
                frame.dst_mac,
                ingress
            );
            Action::Drop(DropReason::LinkDown(LinkFault::SamePort))
        }
        Some(port) => Action::Unicast {
            egress: port,
            frame: *frame,
        },
        None => Action::Flood {
            egress: ctx.linked_ports_except(device, ingress),
        },
    }
}
