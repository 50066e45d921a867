use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use lanscope_common::error::ScanError;
use lanscope_common::network::device::{HostPhase, NetworkRole, OsFamily, Reachability};
use lanscope_common::network::range::PortRange;
use lanscope_core::discovery::{DiscoveredHost, DiscoveryEngine};
use lanscope_core::scanner::{PortScanner, TcpConnectProber};
use lanscope_core::{Orchestrator, ScanEvent, ScanRequest, ScanState};
use pnet::util::MacAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::support::*;

fn v4(ip: Ipv4Addr) -> IpAddr {
    IpAddr::V4(ip)
}

#[tokio::test]
async fn windows_host_is_fingerprinted_from_ttl_and_ports() {
    let host = lan(50);
    let prober = Arc::new(FakeProber::new().open(host, &[80, 445]));
    let discovery = ScriptedDiscovery::new(vec![
        DiscoveredHost::responder(GATEWAY).with_ttl(Some(64)),
        DiscoveredHost::responder(host).with_ttl(Some(128)),
    ]);
    let orch = orchestrator(discovery, prober);

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(20, 1024).unwrap())))
        .await
        .unwrap();
    assert_eq!(handle.wait().await, ScanState::Completed);

    let device = handle.device(v4(host)).unwrap();
    assert_eq!(device.status(), Reachability::Alive);
    assert_eq!(device.open_ports(), &BTreeSet::from([80, 445]));
    assert_eq!(device.phase(), HostPhase::Fingerprinted);

    let os = device.os().unwrap();
    assert_eq!(os.family, OsFamily::Windows);
    assert_eq!(os.label(), "Windows-family");
    assert!(os.confidence > 0.5, "confidence {}", os.confidence);

    let gateway = handle.device(v4(GATEWAY)).unwrap();
    assert_eq!(gateway.status(), Reachability::Alive);
    assert_eq!(gateway.os().unwrap().family, OsFamily::Unix);
}

#[tokio::test]
async fn silent_gateway_is_listed_first_and_unreachable() {
    let others = [lan(20), lan(30)];
    let discovery = ScriptedDiscovery::new(others.iter().map(|ip| DiscoveredHost::responder(*ip)).collect());
    let orch = orchestrator(discovery, Arc::new(FakeProber::new()));

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(20, 30).unwrap())))
        .await
        .unwrap();
    handle.wait().await;

    let snapshot = orch.snapshot(&handle);
    assert_eq!(snapshot.len(), 4);

    let gateway = &snapshot[0];
    assert_eq!(gateway.ip(), v4(GATEWAY));
    assert_eq!(gateway.role(), Some(NetworkRole::Gateway));
    assert_eq!(gateway.status(), Reachability::Unreachable);

    let local = &snapshot[1];
    assert_eq!(local.ip(), v4(LOCAL));
    assert_eq!(local.role(), Some(NetworkRole::LocalHost));
    assert_eq!(local.status(), Reachability::Alive);
    assert_eq!(local.mac(), Some(LOCAL_MAC));

    let rest: Vec<IpAddr> = snapshot[2..].iter().map(|d| d.ip()).collect();
    assert_eq!(rest, vec![v4(lan(20)), v4(lan(30))]);
}

#[tokio::test]
async fn on_demand_scan_adds_unknown_device() {
    let stranger = Ipv4Addr::new(192, 168, 1, 200);
    let prober = Arc::new(FakeProber::new().open(stranger, &[22, 80]));
    let orch = orchestrator(ScriptedDiscovery::new(Vec::new()), prober);

    let handle = orch
        .start_scan(request(offline_config(PortRange::single(443).unwrap())))
        .await
        .unwrap();
    handle.wait().await;
    assert!(handle.device(v4(stranger)).is_none());

    let open = orch
        .scan_ports_for_device(&handle, v4(stranger), PortRange::new(1, 100).unwrap())
        .await
        .unwrap();
    assert_eq!(open, BTreeSet::from([22, 80]));

    let device = handle.device(v4(stranger)).unwrap();
    assert_eq!(device.open_ports(), &BTreeSet::from([22, 80]));
    assert_eq!(device.status(), Reachability::Alive);
    assert_eq!(orch.snapshot(&handle).len(), 3);
}

#[tokio::test]
async fn rescans_only_add_ports() {
    let host = lan(60);
    let prober = Arc::new(FakeProber::new().open(host, &[22, 8080]));
    let discovery = ScriptedDiscovery::new(vec![DiscoveredHost::responder(host)]);
    let orch = orchestrator(discovery, prober);

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(1, 100).unwrap())))
        .await
        .unwrap();
    handle.wait().await;
    assert_eq!(handle.device(v4(host)).unwrap().open_ports(), &BTreeSet::from([22]));

    let open = orch
        .scan_ports_for_device(&handle, v4(host), PortRange::new(8000, 8100).unwrap())
        .await
        .unwrap();
    assert_eq!(open, BTreeSet::from([8080]));
    assert_eq!(
        handle.device(v4(host)).unwrap().open_ports(),
        &BTreeSet::from([22, 8080])
    );
}

#[tokio::test]
async fn resolution_failure_is_reported_before_scanning() {
    let prober = Arc::new(FakeProber::new());
    let orch = orchestrator(ScriptedDiscovery::new(vec![DiscoveredHost::responder(lan(5))]), prober.clone())
        .with_resolver(Arc::new(FakeResolver(Err(ScanError::Resolution("no route".into())))));

    let err = orch
        .start_scan(ScanRequest::new(offline_config(PortRange::default())))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Resolution(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(prober.contacted().is_empty());
}

#[tokio::test]
async fn resolver_is_used_without_an_override() {
    let orch = orchestrator(ScriptedDiscovery::new(Vec::new()), Arc::new(FakeProber::new()));
    let handle = orch
        .start_scan(ScanRequest::new(offline_config(PortRange::single(22).unwrap())))
        .await
        .unwrap();

    assert_eq!(handle.context(), Some(&home_network()));
    handle.wait().await;
    assert_eq!(handle.summary().gateway, Some(GATEWAY));
}

#[tokio::test]
async fn invalid_config_never_starts_a_session() {
    let mut config = offline_config(PortRange::default());
    config.port_concurrency = 0;

    let orch = orchestrator(ScriptedDiscovery::new(Vec::new()), Arc::new(FakeProber::new()));
    let err = orch.start_scan(request(config)).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidConfig(_)));
}

#[tokio::test]
async fn duplicate_responses_yield_one_device() {
    let host = lan(40);
    let discovery = ScriptedDiscovery::new(vec![
        DiscoveredHost::responder(host),
        DiscoveredHost::responder(host).with_mac(MacAddr(2, 0, 0, 0, 0, 40)),
        DiscoveredHost::responder(GATEWAY),
        DiscoveredHost::responder(host),
    ]);
    let orch = orchestrator(discovery, Arc::new(FakeProber::new()));

    let handle = orch
        .start_scan(request(offline_config(PortRange::single(22).unwrap())))
        .await
        .unwrap();
    handle.wait().await;

    let snapshot = handle.snapshot();
    let unique: HashSet<IpAddr> = snapshot.iter().map(|d| d.ip()).collect();
    assert_eq!(unique.len(), snapshot.len());
    assert_eq!(snapshot.len(), 3);
    assert_eq!(handle.device(v4(GATEWAY)).unwrap().status(), Reachability::Alive);
}

#[tokio::test]
async fn falls_back_to_the_next_strategy() {
    let chain = DiscoveryEngine::with_chain(vec![
        Arc::new(Unavailable),
        Arc::new(ScriptedDiscovery::new(vec![DiscoveredHost::responder(lan(77))])),
    ]);
    let orch = orchestrator(ScriptedDiscovery::new(Vec::new()), Arc::new(FakeProber::new())).with_discovery(chain);

    let handle = orch
        .start_scan(request(offline_config(PortRange::single(22).unwrap())))
        .await
        .unwrap();
    handle.wait().await;

    assert_eq!(handle.effective_strategy(), Some("scripted"));
    assert!(handle.device(v4(lan(77))).is_some());
}

#[tokio::test]
async fn no_strategy_still_scans_gateway_and_local_host() {
    let orch = orchestrator(ScriptedDiscovery::new(Vec::new()), Arc::new(FakeProber::new().open(GATEWAY, &[53])))
        .with_discovery(DiscoveryEngine::with_chain(vec![Arc::new(Unavailable)]));

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(50, 60).unwrap())))
        .await
        .unwrap();
    assert_eq!(handle.wait().await, ScanState::Completed);

    assert_eq!(handle.effective_strategy(), None);
    let gateway = handle.device(v4(GATEWAY)).unwrap();
    assert_eq!(gateway.open_ports(), &BTreeSet::from([53]));
    assert_eq!(gateway.status(), Reachability::Alive);
}

#[tokio::test]
async fn enrichment_fills_vendor_hostname_and_banners() {
    let host = lan(90);
    let mac = MacAddr(0x00, 0x00, 0x0c, 0x11, 0x22, 0x33);
    let prober = Arc::new(
        FakeProber::new()
            .open(host, &[22, 23])
            .banner(host, 22, "SSH-2.0-Cisco-1.25"),
    );
    let orch = orchestrator(
        ScriptedDiscovery::new(vec![DiscoveredHost::responder(host).with_mac(mac).with_ttl(Some(255))]),
        prober,
    )
    .with_vendor_repository(Arc::new(StaticVendors(HashMap::from([(mac, "Cisco Systems".to_string())]))))
    .with_hostname_resolver(Arc::new(StaticHostnames(HashMap::from([(v4(host), "core-sw".to_string())]))));

    let mut config = offline_config(PortRange::new(1, 100).unwrap());
    config.resolve_hostnames = true;
    config.grab_banners = true;

    let handle = orch.start_scan(request(config)).await.unwrap();
    handle.wait().await;

    let device = handle.device(v4(host)).unwrap();
    assert_eq!(device.vendor(), Some("Cisco Systems"));
    assert_eq!(device.hostname(), Some("core-sw"));
    assert_eq!(device.banners().get(&22).map(String::as_str), Some("SSH-2.0-Cisco-1.25"));
    assert_eq!(device.os().unwrap().family, OsFamily::NetworkAppliance);
}

#[tokio::test]
async fn events_describe_the_whole_session() {
    let hosts = [lan(2), lan(3)];
    let prober = Arc::new(FakeProber::new().open(lan(3), &[443]));
    let discovery = ScriptedDiscovery::new(hosts.iter().map(|ip| DiscoveredHost::responder(*ip)).collect());
    let orch = orchestrator(discovery, prober);

    let handle = orch
        .start_scan(request(offline_config(PortRange::new(440, 445).unwrap())))
        .await
        .unwrap();
    let mut events = handle.events().unwrap();

    let mut discovered = Vec::new();
    let mut updated_before_discovered = false;
    let mut summary = None;
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::DeviceDiscovered(d) => discovered.push(d.ip()),
            ScanEvent::DeviceUpdated(d) => updated_before_discovered |= !discovered.contains(&d.ip()),
            ScanEvent::ScanCompleted(s) => {
                summary = Some(s);
                break;
            }
            ScanEvent::ScanCancelled(_) => panic!("nobody cancelled"),
        }
    }

    assert!(!updated_before_discovered);
    assert_eq!(discovered.len(), 4);
    let summary = summary.unwrap();
    assert_eq!(summary.session_id, handle.id());
    assert_eq!(summary.total_devices, 4);
    assert_eq!(summary.total_open_ports, 1);
    assert_eq!(summary.state, ScanState::Completed);
}

#[tokio::test]
async fn state_only_moves_forward() {
    let orch = orchestrator(
        ScriptedDiscovery::new(vec![DiscoveredHost::responder(lan(4))]),
        Arc::new(FakeProber::new().with_delay(Duration::from_millis(5))),
    );
    let handle = orch
        .start_scan(request(offline_config(PortRange::new(1, 20).unwrap())))
        .await
        .unwrap();

    let mut rx = handle.watch_state();
    let mut seen = vec![*rx.borrow_and_update()];
    while !seen.last().unwrap().is_terminal() {
        if rx.changed().await.is_err() {
            break;
        }
        seen.push(*rx.borrow_and_update());
    }

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&ScanState::Completed));
}

#[tokio::test]
async fn concurrency_limits_hold_across_hosts() {
    let hosts: Vec<DiscoveredHost> = (100..110).map(|last| DiscoveredHost::responder(lan(last))).collect();
    let prober = Arc::new(FakeProber::new().with_delay(Duration::from_millis(5)));
    let orch = orchestrator(ScriptedDiscovery::new(hosts), prober.clone());

    let mut config = offline_config(PortRange::new(1, 30).unwrap());
    config.host_concurrency = 2;
    config.port_concurrency = 3;

    let handle = orch.start_scan(request(config)).await.unwrap();
    assert_eq!(handle.wait().await, ScanState::Completed);

    assert!(prober.peak() <= 6, "peak {}", prober.peak());
    assert_eq!(prober.contacted().len(), 12);
}

#[tokio::test]
async fn real_listeners_are_found_open() {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ports = [first.local_addr().unwrap().port(), second.local_addr().unwrap().port()];

    let scanner = PortScanner::new(Arc::new(TcpConnectProber), &offline_config(PortRange::default()));
    for port in ports {
        let report = scanner
            .scan_ports(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                PortRange::single(port).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.complete);
        assert_eq!(report.open, BTreeSet::from([port]));
    }
}

#[tokio::test]
async fn default_orchestrator_accepts_an_override() {
    let orch = Orchestrator::new()
        .with_discovery(DiscoveryEngine::with_chain(vec![Arc::new(ScriptedDiscovery::new(Vec::new()))]))
        .with_prober(Arc::new(FakeProber::new()));

    let mut config = offline_config(PortRange::single(9).unwrap());
    config.lookup_vendors = false;

    let handle = orch.start_scan(request(config)).await.unwrap();
    assert_eq!(handle.wait().await, ScanState::Completed);
    assert_eq!(handle.snapshot().len(), 2);
}
