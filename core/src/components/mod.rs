use rand::Rng;

use crate::addr::MacAddr;
use crate::forwarding::{Action, DropReason, ForwardContext, Frame, LinkFault};
use crate::topology::{Device, DeviceKind, Interface};

pub mod access_point;
pub mod firewall;
pub mod host;
pub mod hub;
pub mod router;
pub mod switch;

/// Static facts about a device kind: its display label and which interfaces
/// a fresh device gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub label: &'static str,
    pub port_prefix: &'static str,
    pub port_count: usize,
}

impl Profile {
    pub fn default_interfaces<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Interface> {
        (0..self.port_count)
            .map(|i| Interface::new(format!("{}{}", self.port_prefix, i), MacAddr::random(rng)))
            .collect()
    }
}

macro_rules! register_devices {
    ($($kind:ident => $module:ident),* $(,)?) => {
        pub fn profile(kind: DeviceKind) -> &'static Profile {
            match kind {
                $( DeviceKind::$kind => &$module::PROFILE, )*
            }
        }

        fn dispatch(
            ctx: &ForwardContext<'_>,
            device: &Device,
            ingress: &str,
            frame: &Frame,
        ) -> Action {
            match device.kind {
                $( DeviceKind::$kind => $module::forward(ctx, device, ingress, frame), )*
            }
        }
    };
}

register_devices!(
    Host => host,
    Switch => switch,
    Router => router,
    Hub => hub,
    AccessPoint => access_point,
    Firewall => firewall,
);

/// One forwarding decision for `frame` arriving at `device` on `ingress`.
/// A powered-off device drops everything regardless of kind.
pub fn forward(ctx: &ForwardContext<'_>, device: &Device, ingress: &str, frame: &Frame) -> Action {
    if !device.is_on() {
        return Action::Drop(DropReason::LinkDown(LinkFault::PoweredOff));
    }
    dispatch(ctx, device, ingress, frame)
}
