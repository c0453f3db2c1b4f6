use std::thread;

use netsim_core::*;

use crate::common::{ip, TestHarness};

#[test]
fn test_concurrent_pings_through_one_switch() {
    let h = TestHarness::new();
    let sw = h.add(DeviceKind::Switch);
    let hosts: Vec<DeviceId> = (0..4)
        .map(|n| {
            let pc = h.host(&format!("192.168.1.{}", 10 + n), "255.255.255.0", None);
            h.connect(&pc, "Ethernet0", &sw, &format!("FastEthernet0/{n}"));
            pc
        })
        .collect();
    let topology = h.topology();

    let reports: Vec<PingReport> = thread::scope(|s| {
        let handles: Vec<_> = hosts
            .iter()
            .enumerate()
            .map(|(n, pc)| {
                let (sim, topology) = (&h.sim, &topology);
                // Everybody pings the next host around the ring.
                let target = ip(&format!("192.168.1.{}", 10 + (n + 1) % 4));
                s.spawn(move || ping(sim, topology, pc, target, 8).unwrap())
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    for report in &reports {
        assert_eq!(report.received(), 8, "to {}", report.destination);
    }

    let table = h.sim.mac_table(&sw).unwrap();
    let entries = table.entries(h.sim.now_us());
    assert_eq!(entries.len(), 4);
    for (mac, entry) in entries {
        let (owner, _) = topology
            .devices
            .iter()
            .find_map(|d| d.interfaces.iter().find(|i| i.mac == mac).map(|i| (d, i)))
            .unwrap();
        let port = topology.link_at(&owner.id, "Ethernet0").unwrap();
        assert!(port.has_endpoint(&sw, &entry.interface));
    }
}

#[test]
fn test_snapshot_isolated_from_later_edits() {
    let h = TestHarness::new();
    let pc1 = h.host("192.168.1.10", "255.255.255.0", None);
    let pc2 = h.host("192.168.1.11", "255.255.255.0", None);
    h.connect(&pc1, "Ethernet0", &pc2, "Ethernet0");
    let before = h.topology();

    h.store.disconnect(&pc1, "Ethernet0").unwrap();

    let old = h.sim.probe(&before, &pc1, Probe::echo(ip("192.168.1.11"), 1)).unwrap();
    assert!(old.outcome.is_echo_reply());
    let new = h.probe(&pc1, "192.168.1.11");
    assert!(!new.outcome.is_echo_reply());
}
