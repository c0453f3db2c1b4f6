use crate::forwarding::{Action, ForwardContext, Frame};
use crate::topology::Device;

use super::Profile;

pub const PROFILE: Profile = Profile {
    label: "Hub",
    port_prefix: "Port",
    port_count: 4,
};

/// Repeats every signal out of every other cabled port.
pub fn forward(ctx: &ForwardContext<'_>, device: &Device, ingress: &str, _frame: &Frame) -> Action {
    Action::Flood {
        egress: ctx.linked_ports_except(device, ingress),
    }
}
