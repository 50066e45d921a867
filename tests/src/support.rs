use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lanscope_common::config::ScanConfig;
use lanscope_common::error::ScanError;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::network::range::PortRange;
use lanscope_common::vendors::VendorRepository;
use lanscope_core::discovery::{DiscoveredHost, DiscoveryEngine, DiscoveryStrategy, ProbeSettings};
use lanscope_core::enrich::HostnameResolver;
use lanscope_core::resolver::ContextResolver;
use lanscope_core::scanner::{ProbeOutcome, Prober};
use lanscope_core::{Orchestrator, ScanRequest};
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub const LOCAL_MAC: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x10);

pub fn lan(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, last)
}

pub fn home_network() -> NetworkContext {
    let subnet = Ipv4Network::new(Ipv4Addr::new(192, 168, 1, 0), 24).unwrap();
    NetworkContext::new(LOCAL, subnet)
        .unwrap()
        .with_gateway(Some(GATEWAY))
        .with_mac(Some(LOCAL_MAC))
        .with_interface("eth0")
}

pub fn offline_config(ports: PortRange) -> ScanConfig {
    let mut config = ScanConfig::default().with_port_range(ports);
    config.resolve_hostnames = false;
    config.grab_banners = false;
    config.timeout = Duration::from_millis(200);
    config
}

pub fn request(config: ScanConfig) -> ScanRequest {
    ScanRequest::new(config).with_context(home_network())
}

/// A resolver that always answers the same way.
pub struct FakeResolver(pub Result<NetworkContext, ScanError>);

impl ContextResolver for FakeResolver {
    fn resolve(&self) -> Result<NetworkContext, ScanError> {
        self.0.clone()
    }
}

/// Replays a fixed list of responders, optionally one every `pace`.
pub struct ScriptedDiscovery {
    pub hosts: Vec<DiscoveredHost>,
    pub pace: Option<Duration>,
    /// Keeps the stream open after the last host, as a sweep still waiting
    /// on replies would.
    pub hold_open: bool,
}

impl ScriptedDiscovery {
    pub fn new(hosts: Vec<DiscoveredHost>) -> Self {
        Self {
            hosts,
            pace: None,
            hold_open: false,
        }
    }

    pub fn paced(hosts: Vec<DiscoveredHost>, pace: Duration) -> Self {
        Self {
            pace: Some(pace),
            ..Self::new(hosts)
        }
    }

    pub fn held_open(hosts: Vec<DiscoveredHost>) -> Self {
        Self {
            hold_open: true,
            ..Self::new(hosts)
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for ScriptedDiscovery {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(
        &self,
        _ctx: &NetworkContext,
        _settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>> {
        let (tx, rx) = mpsc::channel(64);
        let hosts = self.hosts.clone();
        let pace = self.pace;
        let hold_open = self.hold_open;

        tokio::spawn(async move {
            for host in hosts {
                if let Some(pace) = pace {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(pace) => {}
                    }
                }
                if tx.send(host).await.is_err() {
                    return;
                }
            }
            if hold_open {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// A strategy that can never run here.
pub struct Unavailable;

#[async_trait]
impl DiscoveryStrategy for Unavailable {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn probe(
        &self,
        _ctx: &NetworkContext,
        _settings: ProbeSettings,
        _cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>> {
        anyhow::bail!("no privileges")
    }
}

/// Answers connects from a table of open ports and records what it was asked.
#[derive(Default)]
pub struct FakeProber {
    open: HashMap<IpAddr, HashSet<u16>>,
    banners: HashMap<(IpAddr, u16), String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    contacted: Mutex<Vec<IpAddr>>,
    pub first_connect: Notify,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, ip: Ipv4Addr, ports: &[u16]) -> Self {
        self.open
            .entry(IpAddr::V4(ip))
            .or_default()
            .extend(ports.iter().copied());
        self
    }

    pub fn banner(mut self, ip: Ipv4Addr, port: u16, text: &str) -> Self {
        self.banners.insert((IpAddr::V4(ip), port), text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Hosts in the order of their first connect attempt.
    pub fn contacted(&self) -> Vec<IpAddr> {
        self.contacted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn connect(&self, addr: SocketAddr, _timeout: Duration) -> ProbeOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        {
            let mut contacted = self.contacted.lock().unwrap();
            if !contacted.contains(&addr.ip()) {
                contacted.push(addr.ip());
            }
        }
        self.first_connect.notify_one();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.open.get(&addr.ip()) {
            Some(ports) if ports.contains(&addr.port()) => ProbeOutcome::Open,
            _ => ProbeOutcome::Closed,
        }
    }

    async fn banner(&self, addr: SocketAddr, _timeout: Duration) -> Option<String> {
        self.banners.get(&(addr.ip(), addr.port())).cloned()
    }
}

pub struct StaticVendors(pub HashMap<MacAddr, String>);

impl VendorRepository for StaticVendors {
    fn get_vendor(&self, mac: MacAddr) -> Option<String> {
        self.0.get(&mac).cloned()
    }
}

pub struct StaticHostnames(pub HashMap<IpAddr, String>);

#[async_trait]
impl HostnameResolver for StaticHostnames {
    async fn lookup(&self, addr: IpAddr) -> Option<String> {
        self.0.get(&addr).cloned()
    }
}

/// An orchestrator wired to fakes only.
pub fn orchestrator(discovery: ScriptedDiscovery, prober: Arc<FakeProber>) -> Orchestrator {
    Orchestrator::new()
        .with_resolver(Arc::new(FakeResolver(Ok(home_network()))))
        .with_discovery(DiscoveryEngine::with_chain(vec![Arc::new(discovery)]))
        .with_prober(prober)
        .with_vendor_repository(Arc::new(StaticVendors(HashMap::new())))
        .with_hostname_resolver(Arc::new(StaticHostnames(HashMap::new())))
}
