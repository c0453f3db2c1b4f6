use crate::forwarding::{addressed_to, Action, ForwardContext, Frame};
use crate::topology::Device;

use super::Profile;

pub const PROFILE: Profile = Profile {
    label: "Host",
    port_prefix: "Ethernet",
    port_count: 1,
};

/// Hosts never forward: they accept what is addressed to them and ignore the rest.
pub fn forward(_ctx: &ForwardContext<'_>, device: &Device, ingress: &str, frame: &Frame) -> Action {
    if addressed_to(device, ingress, frame)
        && device.interface_with_ip(frame.packet.destination).is_some()
    {
        Action::Deliver
    } else {
        Action::Ignore
    }
}
