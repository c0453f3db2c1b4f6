use super::Profile;

pub const PROFILE: Profile = Profile {
    label: "Access Point",
    port_prefix: "Port",
    port_count: 4,
};

pub use super::switch::forward;
