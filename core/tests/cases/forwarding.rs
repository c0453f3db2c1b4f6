use netsim_core::*;

use crate::common::{ip, lan, TestHarness};

fn kinds(invocation: &Invocation) -> Vec<EventKind> {
    invocation.trace.iter().map(|e| e.kind).collect()
}

#[test]
fn test_lan_ping_all_replies() {
    let net = lan(7);
    let report = net.h.ping(&net.pc1, "192.168.1.11", 4);

    assert_eq!(report.transmitted(), 4);
    assert_eq!(report.received(), 4);
    assert_eq!(report.loss_percent(), 0.0);

    // Four 1ms traversals per round trip.
    let stats = report.rtt_stats().unwrap();
    assert_eq!(stats.min_us, 4_000);
    assert_eq!(stats.max_us, 4_000);
    assert_eq!(stats.stddev_us, 0.0);
}

#[test]
fn test_switch_floods_then_unicasts() {
    let net = lan(7);

    let first = net.h.probe(&net.pc1, "192.168.1.11");
    assert_eq!(
        kinds(&first),
        vec![
            EventKind::Sent,
            EventKind::Flooded,
            EventKind::Delivered,
            EventKind::Sent,
            EventKind::Forwarded,
            EventKind::Delivered,
        ]
    );
    assert!(first.outcome.is_echo_reply());

    let second = net.h.probe(&net.pc1, "192.168.1.11");
    assert_eq!(second.events_of(EventKind::Flooded).count(), 0, "both MACs are learned");
    assert_eq!(second.events_of(EventKind::Forwarded).count(), 2);

    let topology = net.h.topology();
    let table = net.h.sim.mac_table(&net.sw).unwrap();
    let entries = table.entries(net.h.sim.now_us());
    assert_eq!(entries.len(), 2);
    let pc1_mac = topology.device(&net.pc1).unwrap().interfaces[0].mac;
    let (mac, entry) = &entries[0];
    assert_eq!(*mac, pc1_mac);
    assert_eq!(entry.interface, "FastEthernet0/0");
}

#[test]
fn test_learned_entries_age_out() {
    let net = lan(7);
    net.h.probe(&net.pc1, "192.168.1.11");

    net.h.sim.advance(MAC_AGING_US + 1);
    let again = net.h.probe(&net.pc1, "192.168.1.11");
    assert_eq!(again.events_of(EventKind::Flooded).count(), 1);
}

#[test]
fn test_trace_is_time_ordered() {
    let net = lan(7);
    let invocation = net.h.probe(&net.pc1, "192.168.1.11");

    assert!(invocation
        .trace
        .windows(2)
        .all(|w| w[0].time_us <= w[1].time_us));
    assert_eq!(invocation.finished_at_us - invocation.started_at_us, 4_000);
}

#[test]
fn test_unassigned_address_is_unreachable() {
    let net = lan(7);
    let invocation = net.h.probe(&net.pc1, "192.168.1.99");

    assert_eq!(
        invocation.outcome,
        Outcome::Dropped {
            reason: DropReason::Unreachable,
            device: net.pc1.clone(),
        }
    );
    assert_eq!(kinds(&invocation), vec![EventKind::DroppedUnreachable]);
}

#[test]
fn test_ping_own_address() {
    let net = lan(7);
    let invocation = net.h.probe(&net.pc1, "192.168.1.10");

    match invocation.outcome {
        Outcome::Replied { rtt_us, kind, .. } => {
            assert_eq!(rtt_us, 0);
            assert_eq!(kind, PacketKind::EchoReply);
        }
        other => panic!("expected a reply, got {other:?}"),
    }
}

#[test]
fn test_powered_off_destination() {
    let net = lan(7);
    net.h.store.set_power(&net.pc2, PowerState::Off).unwrap();

    let invocation = net.h.probe(&net.pc1, "192.168.1.11");
    assert_eq!(
        invocation.outcome,
        Outcome::Dropped {
            reason: DropReason::LinkDown(LinkFault::PoweredOff),
            device: net.pc2.clone(),
        }
    );
    assert_eq!(invocation.events_of(EventKind::Delivered).count(), 0);
}

#[test]
fn test_powered_off_origin_sends_nothing() {
    let net = lan(7);
    net.h.store.set_power(&net.pc1, PowerState::Off).unwrap();

    let invocation = net.h.probe(&net.pc1, "192.168.1.11");
    assert_eq!(
        kinds(&invocation),
        vec![EventKind::DroppedLinkDown(LinkFault::PoweredOff)]
    );
    assert!(net.h.sim.mac_table(&net.sw).is_none());
}

#[test]
fn test_hub_repeats_to_every_port() {
    let h = TestHarness::new();
    let pc1 = h.host("192.168.1.10", "255.255.255.0", None);
    let pc2 = h.host("192.168.1.11", "255.255.255.0", None);
    let pc3 = h.host("192.168.1.12", "255.255.255.0", None);
    let hub = h.add(DeviceKind::Hub);
    h.connect(&pc1, "Ethernet0", &hub, "Port0");
    h.connect(&pc2, "Ethernet0", &hub, "Port1");
    h.connect(&pc3, "Ethernet0", &hub, "Port2");

    let invocation = h.probe(&pc1, "192.168.1.11");
    assert!(invocation.outcome.is_echo_reply());
    // Request and reply are each repeated by the hub.
    assert_eq!(invocation.events_of(EventKind::Flooded).count(), 2);
    assert!(invocation
        .trace
        .iter()
        .all(|e| !(e.device == pc3 && e.kind == EventKind::Delivered)));
}

#[test]
fn test_hub_loop_is_bounded() {
    let h = TestHarness::with_config(SimulatorConfig::default().with_seed(3).with_max_steps(500));
    let pc1 = h.host("192.168.1.10", "255.255.255.0", None);
    let pc2 = h.host("192.168.1.11", "255.255.255.0", None);
    h.store.set_power(&pc2, PowerState::Off).unwrap();
    let hub1 = h.add(DeviceKind::Hub);
    let hub2 = h.add(DeviceKind::Hub);
    h.connect(&pc1, "Ethernet0", &hub1, "Port0");
    h.connect(&pc2, "Ethernet0", &hub2, "Port0");
    h.connect(&hub1, "Port1", &hub2, "Port1");
    h.connect(&hub1, "Port2", &hub2, "Port2");

    let invocation = h.probe(&pc1, "192.168.1.11");

    assert_eq!(invocation.outcome, Outcome::TimedOut);
    assert!(invocation.events_of(EventKind::Flooded).count() <= 500);
    assert_eq!(invocation.trace.last().map(|e| e.kind), Some(EventKind::Timeout));
}

#[test]
fn test_slow_path_times_out() {
    let config = SimulatorConfig::default().with_seed(1).with_timeout_us(1_500);
    let h = TestHarness::with_config(config);
    let pc1 = h.host("192.168.1.10", "255.255.255.0", None);
    let pc2 = h.host("192.168.1.11", "255.255.255.0", None);
    let sw = h.add(DeviceKind::Switch);
    h.connect(&pc1, "Ethernet0", &sw, "FastEthernet0/0");
    h.connect(&pc2, "Ethernet0", &sw, "FastEthernet0/1");

    let invocation = h.probe(&pc1, "192.168.1.11");

    assert_eq!(invocation.outcome, Outcome::TimedOut);
    assert_eq!(invocation.finished_at_us, invocation.started_at_us + 1_500);
    let last = invocation.trace.last().unwrap();
    assert_eq!(last.kind, EventKind::Timeout);
    assert_eq!(last.device, pc1);
    assert_eq!(last.payload.destination, ip("192.168.1.11"));
}

#[test]
fn test_cancelled_invocation_is_abandoned() {
    let net = lan(7);
    let cancel = CancelToken::default();
    cancel.cancel();

    let probe = Probe::echo(ip("192.168.1.11"), 1);
    let invocation = net
        .h
        .sim
        .probe_cancellable(&net.h.topology(), &net.pc1, probe, &cancel)
        .unwrap();

    assert_eq!(invocation.outcome, Outcome::Abandoned);
    assert_eq!(kinds(&invocation), vec![EventKind::Sent]);
}

#[test]
fn test_unknown_source_is_an_error() {
    let net = lan(7);
    let err = net
        .h
        .sim
        .probe(&net.h.topology(), &DeviceId::from("ghost"), Probe::echo(ip("1.1.1.1"), 1))
        .unwrap_err();
    assert!(matches!(err, NetError::UnknownDevice(_)));
}

#[test]
fn test_access_point_bridges_like_a_switch() {
    let h = TestHarness::new();
    let laptop = h.host("192.168.5.20", "255.255.255.0", None);
    let phone = h.host("192.168.5.21", "255.255.255.0", None);
    let ap = h.add(DeviceKind::AccessPoint);
    h.connect(&laptop, "Ethernet0", &ap, "Port0");
    h.connect(&phone, "Ethernet0", &ap, "Port1");

    let report = h.ping(&laptop, "192.168.5.21", 4);
    assert_eq!(report.received(), 4);
    assert_eq!(h.sim.mac_table(&ap).map(|t| t.len()), Some(2));
}

#[test]
fn test_switch_filters_frames_for_its_ingress_segment() {
    let h = TestHarness::new();
    let pc1 = h.host("192.168.1.10", "255.255.255.0", None);
    let pc2 = h.host("192.168.1.11", "255.255.255.0", None);
    let pc3 = h.host("192.168.1.12", "255.255.255.0", None);
    let hub = h.add(DeviceKind::Hub);
    let sw = h.add(DeviceKind::Switch);
    h.connect(&pc1, "Ethernet0", &hub, "Port0");
    h.connect(&pc2, "Ethernet0", &hub, "Port1");
    h.connect(&hub, "Port2", &sw, "FastEthernet0/0");
    h.connect(&pc3, "Ethernet0", &sw, "FastEthernet0/1");

    // Teaches the switch that pc2 sits behind the hub uplink.
    assert!(h.probe(&pc2, "192.168.1.12").outcome.is_echo_reply());

    let invocation = h.probe(&pc1, "192.168.1.11");
    assert!(invocation.outcome.is_echo_reply());
    let filtered: Vec<_> = invocation
        .events_of(EventKind::DroppedLinkDown(LinkFault::SamePort))
        .collect();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].device, sw);
    assert_eq!(filtered[0].interface.as_deref(), Some("FastEthernet0/0"));
    assert_eq!(filtered[0].payload.kind, PacketKind::EchoRequest);
}

#[test]
fn test_replacing_a_switch_starts_with_an_empty_table() {
    let net = lan(7);
    assert_eq!(net.h.ping(&net.pc1, "192.168.1.11", 4).received(), 4);

    net.h.store.remove_device(&net.sw);
    let sw = net.h.add(DeviceKind::Switch);
    assert_ne!(sw, net.sw, "device ids are never reused");
    net.h.connect(&net.pc1, "Ethernet0", &sw, "FastEthernet0/5");
    net.h.connect(&net.pc2, "Ethernet0", &sw, "FastEthernet0/6");

    assert_eq!(net.h.ping(&net.pc1, "192.168.1.11", 4).received(), 4);
    assert!(net.h.sim.mac_table(&net.sw).is_none());
    let out = net.h.run(&sw, "mactable");
    assert!(out.contains(&"Total Mac Addresses: 2".to_string()));
    assert!(out.iter().all(|l| !l.contains("FastEthernet0/1")));
}

#[test]
fn test_swapped_cables_are_relearned() {
    let net = lan(7);
    assert_eq!(net.h.ping(&net.pc1, "192.168.1.11", 2).received(), 2);

    net.h.store.disconnect(&net.pc1, "Ethernet0").unwrap();
    net.h.store.disconnect(&net.pc2, "Ethernet0").unwrap();
    net.h.connect(&net.pc1, "Ethernet0", &net.sw, "FastEthernet0/1");
    net.h.connect(&net.pc2, "Ethernet0", &net.sw, "FastEthernet0/0");

    assert_eq!(net.h.ping(&net.pc1, "192.168.1.11", 4).received(), 4);
    let topology = net.h.topology();
    let table = net.h.sim.mac_table(&net.sw).unwrap();
    let pc1_mac = topology.device(&net.pc1).unwrap().interfaces[0].mac;
    assert_eq!(table.lookup(pc1_mac, net.h.sim.now_us()), Some("FastEthernet0/1"));
}
