use std::sync::Arc;

use netsim_core::{DeviceKind, LinkConfig, LinkState, NetError, PowerState, TopologyStore};

use crate::common::TestHarness;

#[test]
fn test_new_device_gets_profile_interfaces() {
    let store = TopologyStore::with_seed(1);
    let (id, topology) = store.add_device(DeviceKind::Switch);

    let device = topology.device(&id).unwrap();
    assert_eq!(device.power, PowerState::Off, "new devices start powered off");
    assert_eq!(device.interfaces.len(), 8);
    assert_eq!(device.interfaces[0].name, "FastEthernet0/0");
    assert!(device.interfaces.iter().all(|i| i.ip.is_none()));

    let (second, topology) = store.add_device(DeviceKind::Host);
    assert_ne!(id, second);
    assert_eq!(topology.devices.len(), 2);
}

#[test]
fn test_busy_interface_leaves_topology_unchanged() {
    let h = TestHarness::new();
    let a = h.add(DeviceKind::Host);
    let b = h.add(DeviceKind::Host);
    let sw = h.add(DeviceKind::Switch);
    h.connect(&a, "Ethernet0", &sw, "FastEthernet0/0");

    let before = h.topology();
    let err = h
        .store
        .connect(&b, "Ethernet0", &sw, "FastEthernet0/0")
        .unwrap_err();
    assert!(matches!(err, NetError::InterfaceBusy { .. }), "got {err:?}");

    let after = h.topology();
    assert!(Arc::ptr_eq(&before, &after), "failed mutation must not publish");
    assert_eq!(after.links.len(), 1);
}

#[test]
fn test_self_connection_rejected() {
    let h = TestHarness::new();
    let sw = h.add(DeviceKind::Switch);

    let err = h
        .store
        .connect(&sw, "FastEthernet0/0", &sw, "FastEthernet0/1")
        .unwrap_err();
    assert!(matches!(err, NetError::SelfConnection(_)));
    assert!(h.topology().links.is_empty());
}

#[test]
fn test_connect_unknown_interface() {
    let h = TestHarness::new();
    let a = h.add(DeviceKind::Host);
    let b = h.add(DeviceKind::Host);

    let err = h.store.connect(&a, "Ethernet0", &b, "eth9").unwrap_err();
    assert!(matches!(err, NetError::UnknownInterface { .. }));
}

#[test]
fn test_remove_device_removes_only_its_links() {
    let h = TestHarness::new();
    let a = h.add(DeviceKind::Host);
    let b = h.add(DeviceKind::Host);
    let c = h.add(DeviceKind::Host);
    let sw = h.add(DeviceKind::Switch);
    h.connect(&a, "Ethernet0", &sw, "FastEthernet0/0");
    h.connect(&b, "Ethernet0", &sw, "FastEthernet0/1");
    h.connect(&c, "Ethernet0", &sw, "FastEthernet0/2");

    let topology = h.store.remove_device(&b);

    assert!(topology.device(&b).is_none());
    assert_eq!(topology.links.len(), 2);
    assert!(topology.links().all(|l| !l.touches(&b)));
    assert!(topology.link_at(&sw, "FastEthernet0/1").is_none());
    assert!(topology.link_at(&sw, "FastEthernet0/0").is_some());

    // Removing again is a no-op.
    let again = h.store.remove_device(&b);
    assert_eq!(*again, *topology);
}

#[test]
fn test_invalid_address_rejected() {
    let h = TestHarness::new();
    let pc = h.add(DeviceKind::Host);
    let before = h.topology();

    for bad in ["256.1.1.1", "1.2.3", "a.b.c.d", "1.2.3.4.5", "", "1..2.3"] {
        let err = h
            .store
            .set_interface_address(&pc, "Ethernet0", bad, "255.255.255.0")
            .unwrap_err();
        assert!(matches!(err, NetError::InvalidAddress(_)), "{bad:?} gave {err:?}");
    }
    let err = h
        .store
        .set_interface_address(&pc, "Ethernet0", "10.0.0.1", "255.0.255.0")
        .unwrap_err();
    assert!(matches!(err, NetError::InvalidAddress(_)));

    assert_eq!(*h.topology(), *before);
}

#[test]
fn test_switch_interfaces_are_not_addressable() {
    let h = TestHarness::new();
    let sw = h.add(DeviceKind::Switch);

    let err = h
        .store
        .set_interface_address(&sw, "FastEthernet0/0", "10.0.0.1", "255.0.0.0")
        .unwrap_err();
    assert!(matches!(err, NetError::NotAddressable { kind: DeviceKind::Switch, .. }));
}

#[test]
fn test_remove_linked_interface_refused() {
    let h = TestHarness::new();
    let (r1, ports) = h.router(&[("10.0.0.1", "255.255.255.0"), ("10.0.1.1", "255.255.255.0")]);
    assert_eq!(ports, vec!["GigabitEthernet0/0".to_string(), "Interface1".to_string()]);
    let pc = h.host("10.0.0.2", "255.255.255.0", None);
    h.connect(&pc, "Ethernet0", &r1, "Interface1");

    let err = h.store.remove_interface(&r1, "Interface1").unwrap_err();
    assert!(matches!(err, NetError::InterfaceInUse { .. }));

    h.store.disconnect(&pc, "Ethernet0").unwrap();
    let topology = h.store.remove_interface(&r1, "Interface1").unwrap();
    assert_eq!(topology.device(&r1).unwrap().interfaces.len(), 1);
}

#[test]
fn test_link_state_and_config_edits() {
    let h = TestHarness::new();
    let a = h.add(DeviceKind::Host);
    let b = h.add(DeviceKind::Host);
    h.connect(&a, "Ethernet0", &b, "Ethernet0");

    // Either endpoint addresses the link.
    let topology = h.store.set_link_state(&b, "Ethernet0", LinkState::Down).unwrap();
    assert!(!topology.link_at(&a, "Ethernet0").unwrap().is_up());

    let config = LinkConfig::default().with_latency_us(5_000);
    let topology = h.store.set_link_config(&a, "Ethernet0", config).unwrap();
    assert_eq!(topology.link_at(&b, "Ethernet0").unwrap().config.latency_us, 5_000);

    let err = h
        .store
        .set_link_config(&a, "Ethernet0", LinkConfig::default().with_loss_rate(1.5))
        .unwrap_err();
    assert!(matches!(err, NetError::InvalidLinkConfig(_)));

    let err = h.store.disconnect(&a, "Ethernet1").unwrap_err();
    assert!(matches!(err, NetError::NotConnected { .. }));
}

#[test]
fn test_duplicate_static_route_rejected() {
    let h = TestHarness::new();
    let (r1, _) = h.router(&[("10.0.0.1", "255.255.255.0")]);

    h.store
        .add_static_route(&r1, "10.9.0.7", "255.255.0.0", "10.0.0.2", 1)
        .unwrap();
    let topology = h.topology();
    let route = topology.device(&r1).unwrap().routes[0];
    assert_eq!(route.prefix, crate::common::ip("10.9.0.0"), "prefix is normalized");

    let err = h
        .store
        .add_static_route(&r1, "10.9.0.0", "255.255.0.0", "10.0.0.2", 5)
        .unwrap_err();
    assert!(matches!(err, NetError::DuplicateRoute { .. }));

    let host = h.add(DeviceKind::Host);
    let err = h
        .store
        .add_static_route(&host, "10.9.0.0", "255.255.0.0", "10.0.0.2", 1)
        .unwrap_err();
    assert!(matches!(err, NetError::NotAddressable { .. }));
}

#[test]
fn test_snapshot_outlives_mutation() {
    let h = TestHarness::new();
    let pc = h.add(DeviceKind::Host);
    let old = h.topology();

    h.store.rename_device(&pc, "Workstation").unwrap();

    assert_ne!(old.device(&pc).unwrap().name, "Workstation");
    assert_eq!(h.topology().device(&pc).unwrap().name, "Workstation");
    assert!(h.topology().device_by_name("Workstation").is_some());
}
