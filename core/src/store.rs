use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::addr::{network_of, parse_ipv4, parse_mask, MacAddr};
use crate::components;
use crate::error::{NetError, Result};
use crate::firewall::{FirewallPolicy, FirewallRule};
use crate::routing::StaticRoute;
use crate::topology::{
    Device, DeviceId, DeviceKind, Endpoint, Interface, Link, LinkConfig, LinkState, Position,
    PowerState, Topology,
};

/// Sole writer of the device graph. Every mutation works on a private copy of
/// the current snapshot and publishes it only if the whole edit succeeded, so
/// readers holding an older `Arc<Topology>` never see a half-applied change.
pub struct TopologyStore {
    current: RwLock<Arc<Topology>>,
    rng: Mutex<StdRng>,
    /// Highest device ordinal handed out so far; ids are never reused.
    issued: AtomicUsize,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::with_rng(Topology::default(), StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(Topology::default(), StdRng::seed_from_u64(seed))
    }

    pub fn from_topology(topology: Topology) -> Self {
        Self::with_rng(topology, StdRng::from_entropy())
    }

    fn with_rng(topology: Topology, rng: StdRng) -> Self {
        Self {
            issued: AtomicUsize::new(topology.devices.len()),
            current: RwLock::new(Arc::new(topology)),
            rng: Mutex::new(rng),
        }
    }

    pub fn snapshot(&self) -> Arc<Topology> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the whole graph, e.g. after loading a file.
    pub fn replace(&self, topology: Topology) -> Arc<Topology> {
        self.issued.fetch_max(topology.devices.len(), Ordering::SeqCst);
        let next = Arc::new(topology);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }

    /// Applies an edit that cannot fail and publishes the result.
    fn publish<T>(
        &self,
        edit: impl FnOnce(&mut Topology, &mut StdRng) -> T,
    ) -> (T, Arc<Topology>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = Topology::clone(&current);
        let value = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            edit(&mut draft, &mut rng)
        };
        let next = Arc::new(draft);
        *current = Arc::clone(&next);
        (value, next)
    }

    fn mutate<T>(
        &self,
        edit: impl FnOnce(&mut Topology, &mut StdRng) -> Result<T>,
    ) -> Result<(T, Arc<Topology>)> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = Topology::clone(&current);
        let value = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            edit(&mut draft, &mut rng)?
        };
        let next = Arc::new(draft);
        *current = Arc::clone(&next);
        Ok((value, next))
    }

    fn mutate_device(
        &self,
        id: &DeviceId,
        edit: impl FnOnce(&mut Device) -> Result<()>,
    ) -> Result<Arc<Topology>> {
        self.mutate(|topology, _| {
            let device = topology
                .device_mut(id)
                .ok_or_else(|| NetError::UnknownDevice(id.clone()))?;
            edit(device)
        })
        .map(|(_, snapshot)| snapshot)
    }

    pub fn add_device(&self, kind: DeviceKind) -> (DeviceId, Arc<Topology>) {
        self.add_device_at(kind, Position::default())
    }

    /// Creates a powered-off device with the default interfaces of its kind.
    pub fn add_device_at(
        &self,
        kind: DeviceKind,
        position: Position,
    ) -> (DeviceId, Arc<Topology>) {
        let (id, snapshot) = self.publish(|topology, rng| {
            let profile = components::profile(kind);
            let (ordinal, id) = loop {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                let candidate = DeviceId(format!("device-{n}"));
                if topology.device(&candidate).is_none() {
                    break (n, candidate);
                }
            };
            topology.devices.push(Device {
                id: id.clone(),
                kind,
                name: format!("{}-{}", profile.label.replace(' ', ""), ordinal),
                position,
                power: PowerState::Off,
                interfaces: profile.default_interfaces(rng),
                routes: Vec::new(),
                firewall: FirewallPolicy::default(),
                configuration: serde_json::Map::new(),
            });
            id
        });
        debug!("added {kind} {id}");
        (id, snapshot)
    }

    /// Removes the device and every link touching it. Unknown ids are a no-op.
    pub fn remove_device(&self, id: &DeviceId) -> Arc<Topology> {
        let (removed, snapshot) = self.publish(|topology, _| {
            let before = topology.devices.len();
            topology.devices.retain(|d| &d.id != id);
            topology.links.retain(|_, link| !link.touches(id));
            before != topology.devices.len()
        });
        if removed {
            debug!("removed device {id}");
        }
        snapshot
    }

    pub fn rename_device(&self, id: &DeviceId, name: &str) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            device.name = name.to_string();
            Ok(())
        })
    }

    pub fn move_device(&self, id: &DeviceId, position: Position) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            device.position = position;
            Ok(())
        })
    }

    pub fn set_power(&self, id: &DeviceId, power: PowerState) -> Result<Arc<Topology>> {
        debug!("{id}: power {power:?}");
        self.mutate_device(id, |device| {
            device.power = power;
            Ok(())
        })
    }

    pub fn set_configuration(
        &self,
        id: &DeviceId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            device.configuration.insert(key.to_string(), value);
            Ok(())
        })
    }

    /// Appends `Interface<n>` with a fresh hardware address.
    pub fn add_interface(&self, id: &DeviceId) -> Result<(String, Arc<Topology>)> {
        self.mutate(|topology, rng| {
            let device = topology
                .device_mut(id)
                .ok_or_else(|| NetError::UnknownDevice(id.clone()))?;
            let mut n = device.interfaces.len();
            while device.interface(&format!("Interface{n}")).is_some() {
                n += 1;
            }
            let name = format!("Interface{n}");
            device
                .interfaces
                .push(Interface::new(name.clone(), MacAddr::random(rng)));
            Ok(name)
        })
    }

    pub fn remove_interface(&self, id: &DeviceId, interface: &str) -> Result<Arc<Topology>> {
        self.mutate(|topology, _| {
            if topology.link_at(id, interface).is_some() {
                return Err(NetError::InterfaceInUse {
                    device: id.clone(),
                    interface: interface.to_string(),
                });
            }
            let device = topology
                .device_mut(id)
                .ok_or_else(|| NetError::UnknownDevice(id.clone()))?;
            let index = device
                .interfaces
                .iter()
                .position(|i| i.name == interface)
                .ok_or_else(|| unknown_interface(id, interface))?;
            device.interfaces.remove(index);
            Ok(())
        })
        .map(|(_, snapshot)| snapshot)
    }

    pub fn connect(
        &self,
        a: &DeviceId,
        a_interface: &str,
        b: &DeviceId,
        b_interface: &str,
    ) -> Result<Arc<Topology>> {
        self.connect_with(a, a_interface, b, b_interface, LinkConfig::default())
    }

    /// Cables two free interfaces of two different devices together.
    pub fn connect_with(
        &self,
        a: &DeviceId,
        a_interface: &str,
        b: &DeviceId,
        b_interface: &str,
        config: LinkConfig,
    ) -> Result<Arc<Topology>> {
        validate_link_config(&config)?;
        let (_, snapshot) = self.mutate(|topology, _| {
            let link = Link {
                a: Endpoint::new(a, a_interface),
                b: Endpoint::new(b, b_interface),
                state: LinkState::Up,
                config,
            };
            insert_link(topology, link)
        })?;
        debug!("linked {a}:{a_interface} <-> {b}:{b_interface}");
        Ok(snapshot)
    }

    pub fn disconnect(&self, id: &DeviceId, interface: &str) -> Result<Arc<Topology>> {
        self.mutate(|topology, _| {
            let key = topology
                .link_key_at(id, interface)
                .ok_or_else(|| not_connected(id, interface))?;
            topology.links.remove(&key);
            Ok(())
        })
        .map(|(_, snapshot)| snapshot)
    }

    pub fn set_link_state(
        &self,
        id: &DeviceId,
        interface: &str,
        state: LinkState,
    ) -> Result<Arc<Topology>> {
        debug!("{id}:{interface}: link {state}");
        self.edit_link(id, interface, |link| link.state = state)
    }

    pub fn set_link_config(
        &self,
        id: &DeviceId,
        interface: &str,
        config: LinkConfig,
    ) -> Result<Arc<Topology>> {
        validate_link_config(&config)?;
        self.edit_link(id, interface, |link| link.config = config)
    }

    fn edit_link(
        &self,
        id: &DeviceId,
        interface: &str,
        edit: impl FnOnce(&mut Link),
    ) -> Result<Arc<Topology>> {
        self.mutate(|topology, _| {
            let key = topology
                .link_key_at(id, interface)
                .ok_or_else(|| not_connected(id, interface))?;
            if let Some(link) = topology.links.get_mut(&key) {
                edit(link);
            }
            Ok(())
        })
        .map(|(_, snapshot)| snapshot)
    }

    /// Assigns an IPv4 address and mask; both are validated before anything changes.
    pub fn set_interface_address(
        &self,
        id: &DeviceId,
        interface: &str,
        ip: &str,
        mask: &str,
    ) -> Result<Arc<Topology>> {
        let ip = parse_ipv4(ip)?;
        let mask = parse_mask(mask)?;
        debug!("{id}:{interface}: address {ip} mask {mask}");
        self.mutate_device(id, |device| {
            ensure_addressable(device)?;
            let iface = device
                .interface_mut(interface)
                .ok_or_else(|| unknown_interface(id, interface))?;
            iface.ip = Some(ip);
            iface.mask = Some(mask);
            Ok(())
        })
    }

    pub fn clear_interface_address(&self, id: &DeviceId, interface: &str) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            let iface = device
                .interface_mut(interface)
                .ok_or_else(|| unknown_interface(id, interface))?;
            iface.ip = None;
            iface.mask = None;
            iface.gateway = None;
            Ok(())
        })
    }

    /// Sets or clears (`None`) a host interface's default gateway.
    pub fn set_gateway(
        &self,
        id: &DeviceId,
        interface: &str,
        gateway: Option<&str>,
    ) -> Result<Arc<Topology>> {
        let gateway = gateway.map(parse_ipv4).transpose()?;
        self.mutate_device(id, |device| {
            if device.kind != DeviceKind::Host {
                return Err(NetError::NotAddressable {
                    device: device.id.clone(),
                    kind: device.kind,
                });
            }
            let iface = device
                .interface_mut(interface)
                .ok_or_else(|| unknown_interface(id, interface))?;
            iface.gateway = gateway;
            Ok(())
        })
    }

    pub fn add_static_route(
        &self,
        id: &DeviceId,
        prefix: &str,
        mask: &str,
        next_hop: &str,
        metric: u32,
    ) -> Result<Arc<Topology>> {
        let mask = parse_mask(mask)?;
        let route = StaticRoute {
            prefix: network_of(parse_ipv4(prefix)?, mask),
            mask,
            next_hop: parse_ipv4(next_hop)?,
            metric,
        };
        self.mutate_device(id, |device| {
            ensure_routed(device)?;
            if device.routes.iter().any(|r| {
                r.prefix == route.prefix && r.mask == route.mask && r.next_hop == route.next_hop
            }) {
                return Err(NetError::DuplicateRoute {
                    device: device.id.clone(),
                    prefix: route.prefix,
                    mask: route.mask,
                    next_hop: route.next_hop,
                });
            }
            device.routes.push(route);
            Ok(())
        })
    }

    /// Removes every static route for the given prefix and mask.
    pub fn remove_static_route(
        &self,
        id: &DeviceId,
        prefix: &str,
        mask: &str,
    ) -> Result<Arc<Topology>> {
        let mask = parse_mask(mask)?;
        let prefix = network_of(parse_ipv4(prefix)?, mask);
        self.mutate_device(id, |device| {
            ensure_routed(device)?;
            device
                .routes
                .retain(|r| !(r.prefix == prefix && r.mask == mask));
            Ok(())
        })
    }

    pub fn add_firewall_rule(&self, id: &DeviceId, rule: FirewallRule) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            ensure_kind(device, DeviceKind::Firewall)?;
            device.firewall.rules.push(rule);
            Ok(())
        })
    }

    pub fn clear_firewall_rules(&self, id: &DeviceId) -> Result<Arc<Topology>> {
        self.mutate_device(id, |device| {
            ensure_kind(device, DeviceKind::Firewall)?;
            device.firewall.rules.clear();
            Ok(())
        })
    }
}

/// Checks every link invariant and inserts. Shared with the loader.
pub(crate) fn insert_link(topology: &mut Topology, link: Link) -> Result<()> {
    if link.a.device == link.b.device {
        return Err(NetError::SelfConnection(link.a.device.clone()));
    }
    for end in [&link.a, &link.b] {
        let device = topology
            .device(&end.device)
            .ok_or_else(|| NetError::UnknownDevice(end.device.clone()))?;
        if device.interface(&end.interface).is_none() {
            return Err(unknown_interface(&end.device, &end.interface));
        }
        if topology.link_at(&end.device, &end.interface).is_some() {
            return Err(NetError::InterfaceBusy {
                device: end.device.clone(),
                interface: end.interface.clone(),
            });
        }
    }
    topology.links.insert(link.a.clone(), link);
    Ok(())
}

pub(crate) fn validate_link_config(config: &LinkConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&config.loss_rate) {
        return Err(NetError::InvalidLinkConfig(format!(
            "loss rate {} outside [0, 1]",
            config.loss_rate
        )));
    }
    Ok(())
}

fn ensure_addressable(device: &Device) -> Result<()> {
    if device.kind.is_addressable() {
        Ok(())
    } else {
        Err(NetError::NotAddressable {
            device: device.id.clone(),
            kind: device.kind,
        })
    }
}

fn ensure_routed(device: &Device) -> Result<()> {
    if device.kind.is_routed() {
        Ok(())
    } else {
        Err(NetError::NotAddressable {
            device: device.id.clone(),
            kind: device.kind,
        })
    }
}

fn ensure_kind(device: &Device, kind: DeviceKind) -> Result<()> {
    if device.kind == kind {
        Ok(())
    } else {
        Err(NetError::NotAddressable {
            device: device.id.clone(),
            kind: device.kind,
        })
    }
}

fn unknown_interface(device: &DeviceId, interface: &str) -> NetError {
    NetError::UnknownInterface {
        device: device.clone(),
        interface: interface.to_string(),
    }
}

fn not_connected(device: &DeviceId, interface: &str) -> NetError {
    NetError::NotConnected {
        device: device.clone(),
        interface: interface.to_string(),
    }
}
