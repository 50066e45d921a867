use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use lanscope_common::network::device::HostPhase;
use lanscope_common::network::range::PortRange;
use lanscope_core::discovery::DiscoveredHost;
use lanscope_core::{ScanEvent, ScanState};

use crate::support::*;

#[tokio::test]
async fn cancel_mid_scan_starts_no_new_hosts() {
    let hosts: Vec<DiscoveredHost> = (20..25).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new().with_delay(Duration::from_millis(20)));
    let orch = orchestrator(ScriptedDiscovery::new(hosts), prober.clone());

    let mut config = offline_config(PortRange::new(1, 4).unwrap());
    config.host_concurrency = 1;
    config.port_concurrency = 1;

    let handle = orch.start_scan(request(config)).await.unwrap();
    prober.first_connect.notified().await;
    orch.cancel_scan(&handle);

    assert_eq!(handle.wait().await, ScanState::Cancelled);
    assert_eq!(prober.contacted(), vec![IpAddr::V4(lan(20))]);

    let scanned: Vec<IpAddr> = handle
        .snapshot()
        .iter()
        .filter(|d| d.phase() > HostPhase::Discovered)
        .map(|d| d.ip())
        .collect();
    assert_eq!(scanned, vec![IpAddr::V4(lan(20))]);
}

#[tokio::test]
async fn in_flight_host_keeps_its_results() {
    let host = lan(20);
    let prober = Arc::new(
        FakeProber::new()
            .open(host, &[1, 2, 3, 4])
            .with_delay(Duration::from_millis(20)),
    );
    let orch = orchestrator(ScriptedDiscovery::new(vec![DiscoveredHost::responder(host)]), prober.clone());

    let mut config = offline_config(PortRange::new(1, 4).unwrap());
    config.port_concurrency = 4;

    let handle = orch.start_scan(request(config)).await.unwrap();
    prober.first_connect.notified().await;
    handle.cancel();
    handle.wait().await;

    let device = handle.device(IpAddr::V4(host)).unwrap();
    assert_eq!(device.open_ports().len(), 4);
    assert_eq!(device.phase(), HostPhase::Fingerprinted);
}

#[tokio::test]
async fn cancel_during_discovery_keeps_found_hosts() {
    let hosts: Vec<DiscoveredHost> = (30..40).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new());
    let orch = orchestrator(
        ScriptedDiscovery::paced(hosts, Duration::from_millis(50)),
        prober.clone(),
    );

    let handle = orch
        .start_scan(request(offline_config(PortRange::single(22).unwrap())))
        .await
        .unwrap();
    let mut events = handle.events().unwrap();

    match events.recv().await {
        Some(ScanEvent::DeviceDiscovered(d)) => assert_eq!(d.ip(), IpAddr::V4(lan(30))),
        other => panic!("unexpected event {other:?}"),
    }
    handle.cancel();
    assert_eq!(handle.wait().await, ScanState::Cancelled);

    let snapshot = handle.snapshot();
    assert!(snapshot.iter().any(|d| d.is_gateway()));
    assert!(snapshot.iter().any(|d| d.is_local_host()));
    assert!(snapshot.len() < 12);
    assert!(prober.contacted().is_empty());
}

#[tokio::test]
async fn cancel_while_discovering_never_enters_scanning() {
    let hosts: Vec<DiscoveredHost> = (40..43).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new());
    let orch = orchestrator(ScriptedDiscovery::held_open(hosts), prober.clone());

    let handle = orch
        .start_scan(request(offline_config(PortRange::single(22).unwrap())))
        .await
        .unwrap();
    let mut events = handle.events().unwrap();
    for _ in 0..3 {
        assert!(matches!(events.recv().await, Some(ScanEvent::DeviceDiscovered(_))));
    }

    let mut states = handle.watch_state();
    assert_eq!(*states.borrow_and_update(), ScanState::Discovering);
    handle.cancel();

    let mut seen = Vec::new();
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        seen.push(state);
        if state.is_terminal() {
            break;
        }
    }
    assert_eq!(seen, vec![ScanState::Cancelled]);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.iter().all(|d| d.phase() == HostPhase::Discovered));
    assert!(prober.contacted().is_empty());
}

#[tokio::test]
async fn snapshot_is_stable_once_cancelled() {
    let hosts: Vec<DiscoveredHost> = (50..60).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new().with_delay(Duration::from_millis(10)));
    let orch = orchestrator(ScriptedDiscovery::new(hosts), prober.clone());

    let mut config = offline_config(PortRange::new(1, 10).unwrap());
    config.host_concurrency = 3;

    let handle = orch.start_scan(request(config)).await.unwrap();
    prober.first_connect.notified().await;
    handle.cancel();
    handle.wait().await;

    let settled = handle.snapshot();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot(), settled);
}

#[tokio::test]
async fn cancelled_session_reports_partial_summary() {
    let hosts: Vec<DiscoveredHost> = (70..80).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new().with_delay(Duration::from_millis(10)));
    let orch = orchestrator(ScriptedDiscovery::new(hosts), prober.clone());

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(1, 10).unwrap())))
        .await
        .unwrap();
    let mut events = handle.events().unwrap();
    prober.first_connect.notified().await;
    handle.cancel();

    let mut summary = None;
    while let Some(event) = events.recv().await {
        if let ScanEvent::ScanCancelled(s) = event {
            summary = Some(s);
            break;
        }
        assert!(!matches!(event, ScanEvent::ScanCompleted(_)));
    }

    let summary = summary.unwrap();
    assert_eq!(summary.state, ScanState::Cancelled);
    assert_eq!(summary.total_devices, 12);
    assert!(summary.finished_at.is_some());
}
