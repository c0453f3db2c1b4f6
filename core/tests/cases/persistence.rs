use netsim_core::*;

use crate::common::{ip, router_chain, TestHarness};

#[test]
fn test_round_trip_preserves_topology() {
    let chain = router_chain();
    let h = &chain.h;
    h.store
        .set_link_config(
            &chain.r1,
            "Interface1",
            LinkConfig::default().with_latency_us(7_500).with_loss_rate(0.25),
        )
        .unwrap();
    h.store
        .set_link_state(&chain.pc2, "Ethernet0", LinkState::Down)
        .unwrap();
    h.store
        .move_device(&chain.pc1, Position { x: 120.5, y: -40.0 })
        .unwrap();
    h.store
        .set_configuration(&chain.r1, "hostname", serde_json::json!("edge"))
        .unwrap();
    let original = h.topology();

    let text = original.to_json().unwrap();
    let reloaded = Topology::from_json(&text).unwrap();

    assert_eq!(reloaded, *original);
}

#[test]
fn test_save_and_load_file() {
    let h = TestHarness::new();
    let (fw, _) = h.firewall(&[("10.0.1.1", "255.255.255.0"), ("10.0.2.1", "255.255.255.0")]);
    let rule = FirewallRule::deny()
        .from_subnet(ip("10.0.1.0"), ip("255.255.255.0"))
        .on_port(22);
    h.store.add_firewall_rule(&fw, rule).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.json");
    h.topology().save(&path).unwrap();

    let loaded = Topology::load(&path).unwrap();
    assert_eq!(loaded, *h.topology());
    assert_eq!(loaded.device(&fw).unwrap().firewall.rules, vec![rule]);
}

#[test]
fn test_loads_legacy_device_array() {
    let legacy = r#"[
        {
            "id": "pc-a",
            "type": "computer",
            "name": "PC A",
            "x": 10,
            "y": 20,
            "status": "on",
            "interfaces": [
                { "name": "eth0", "mac": "02:00:00:00:00:01", "ip": "192.168.0.2", "subnet": "255.255.255.0", "gateway": "" }
            ],
            "connections": [
                { "targetId": "pc-b", "sourceInterface": "eth0", "targetInterface": "eth0", "status": "up" }
            ]
        },
        {
            "id": "pc-b",
            "type": "computer",
            "name": "PC B",
            "status": "on",
            "interfaces": [
                { "name": "eth0", "mac": "02:00:00:00:00:02", "ip": "192.168.0.3", "subnet": "255.255.255.0" }
            ],
            "connections": [
                { "targetId": "pc-a", "sourceInterface": "eth0", "targetInterface": "eth0", "status": "up" }
            ]
        }
    ]"#;

    let topology = Topology::from_json(legacy).unwrap();

    assert_eq!(topology.devices.len(), 2);
    assert_eq!(topology.links.len(), 1, "mirrored connection is stored once");
    let pc_a = topology.device(&DeviceId::from("pc-a")).unwrap();
    assert_eq!(pc_a.kind, DeviceKind::Host);
    assert_eq!(pc_a.position, Position { x: 10.0, y: 20.0 });
    assert_eq!(pc_a.interfaces[0].gateway, None);
    assert_eq!(pc_a.interfaces[0].mac.to_string(), "02:00:00:00:00:01");
    let link = topology.link_at(&DeviceId::from("pc-b"), "eth0").unwrap();
    assert_eq!(link.config, LinkConfig::default());

    // Loaded topologies are live: the two hosts can reach each other.
    let sim = Simulator::new(SimulatorConfig::default().with_seed(1));
    let report = ping(&sim, &topology, &pc_a.id, ip("192.168.0.3"), 2).unwrap();
    assert_eq!(report.received(), 2);
}

#[test]
fn test_rejects_inconsistent_files() {
    let self_link = r#"{"devices": [
        {"id": "s", "kind": "switch", "name": "S", "interfaces": [
            {"name": "p0", "mac": "02:00:00:00:00:01"},
            {"name": "p1", "mac": "02:00:00:00:00:02"}
        ], "connections": [
            {"targetId": "s", "sourceInterface": "p0", "targetInterface": "p1", "status": "up"}
        ]}
    ]}"#;
    assert!(matches!(
        Topology::from_json(self_link),
        Err(NetError::SelfConnection(_))
    ));

    let duplicate = r#"{"devices": [
        {"id": "a", "kind": "hub", "name": "A"},
        {"id": "a", "kind": "hub", "name": "B"}
    ]}"#;
    assert!(matches!(
        Topology::from_json(duplicate),
        Err(NetError::DuplicateDevice(_))
    ));

    let half_address = r#"{"devices": [
        {"id": "a", "kind": "host", "name": "A", "interfaces": [
            {"name": "eth0", "mac": "02:00:00:00:00:01", "ip": "10.0.0.1"}
        ]}
    ]}"#;
    assert!(matches!(
        Topology::from_json(half_address),
        Err(NetError::InvalidAddress(_))
    ));

    assert!(matches!(
        Topology::from_json("{ not json"),
        Err(NetError::Persist(_))
    ));
}

#[test]
fn test_loads_editor_files_that_reuse_first_interfaces() {
    // Every connection names the first interface on both ends, and the hub
    // has no interfaces at all.
    let editor = r#"[
        {"id": "device-1", "type": "switch", "name": "Switch-1", "x": 0, "y": 0,
         "status": "on", "connections": [], "configuration": {},
         "interfaces": [
            {"name": "FastEthernet0/0", "mac": "02:00:00:00:01:00"},
            {"name": "FastEthernet0/1", "mac": "02:00:00:00:01:01"},
            {"name": "FastEthernet0/2", "mac": "02:00:00:00:01:02"}
         ]},
        {"id": "device-2", "type": "computer", "name": "Computer-2", "status": "on",
         "interfaces": [{"name": "Ethernet0", "mac": "02:00:00:00:02:00",
                         "ip": "10.1.1.2", "subnet": "255.255.255.0", "gateway": ""}],
         "connections": [{"targetId": "device-1", "sourceInterface": "Ethernet0",
                          "targetInterface": "FastEthernet0/0", "status": "up"}]},
        {"id": "device-3", "type": "computer", "name": "Computer-3", "status": "on",
         "interfaces": [{"name": "Ethernet0", "mac": "02:00:00:00:03:00",
                         "ip": "10.1.1.3", "subnet": "255.255.255.0", "gateway": ""}],
         "connections": [{"targetId": "device-1", "sourceInterface": "Ethernet0",
                          "targetInterface": "FastEthernet0/0", "status": "up"}]},
        {"id": "device-4", "type": "hub", "name": "Hub-4", "status": "on",
         "interfaces": [],
         "connections": [{"targetId": "device-1", "sourceInterface": "",
                          "targetInterface": "FastEthernet0/0", "status": "up"}]},
        {"id": "device-5", "type": "computer", "name": "Computer-5", "status": "on",
         "interfaces": [{"name": "Ethernet0", "mac": "02:00:00:00:05:00",
                         "ip": "10.1.1.5", "subnet": "255.255.255.0", "gateway": ""}],
         "connections": [{"targetId": "device-4", "sourceInterface": "Ethernet0",
                          "targetInterface": "", "status": "up"}]}
    ]"#;

    let topology = Topology::from_json(editor).unwrap();
    assert_eq!(topology.links.len(), 4);

    let switch = DeviceId::from("device-1");
    let hub = DeviceId::from("device-4");
    let peer = |port: &str| topology.peer(&switch, port).map(|e| e.device.clone());
    assert_eq!(peer("FastEthernet0/0"), Some(DeviceId::from("device-2")));
    assert_eq!(peer("FastEthernet0/1"), Some(DeviceId::from("device-3")));
    assert_eq!(peer("FastEthernet0/2"), Some(hub.clone()));

    let hub_ports: Vec<_> = topology
        .device(&hub)
        .unwrap()
        .interfaces
        .iter()
        .map(|i| i.name.as_str())
        .collect();
    assert_eq!(hub_ports, vec!["Port0", "Port1"]);

    let sim = Simulator::new(SimulatorConfig::default().with_seed(4));
    let report = ping(&sim, &topology, &DeviceId::from("device-3"), ip("10.1.1.5"), 2).unwrap();
    assert_eq!(report.received(), 2);
}
