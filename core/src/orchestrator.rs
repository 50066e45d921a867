//! Drives one scan session from context resolution to the final summary.
//!
//! The pipeline runs on its own task: discovery feeds the device table, then
//! every found host is port scanned (a bounded number at a time) and
//! fingerprinted as soon as its own scan finishes.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lanscope_common::config::ScanConfig;
use lanscope_common::error::ScanError;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::network::device::{Device, HostPhase, NetworkRole};
use lanscope_common::network::range::PortRange;
use lanscope_common::vendors::VendorRepository;
use lanscope_common::{debug, info, success, warn};
use tokio_util::sync::CancellationToken;

use crate::discovery::{DiscoveredHost, DiscoveryEngine, ProbeSettings};
use crate::enrich::{HostnameResolver, ReverseDns};
use crate::fingerprint::{FingerprintEngine, FingerprintInput};
use crate::network::fanout::bounded_fan_out;
use crate::resolver::{ContextResolver, SystemResolver};
use crate::scanner::{PortScanReport, PortScanner, Prober, TcpConnectProber};
use crate::session::{ScanSession, ScanState, SessionHandle};
use crate::vendors::MacOuiRepo;

/// What to scan and how.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Skips resolution and scans this context instead.
    pub context_override: Option<NetworkContext>,
    pub config: ScanConfig,
}

impl ScanRequest {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            context_override: None,
            config,
        }
    }

    pub fn with_context(mut self, ctx: NetworkContext) -> Self {
        self.context_override = Some(ctx);
        self
    }
}

pub struct Orchestrator {
    resolver: Arc<dyn ContextResolver>,
    /// `None` picks the default chain for each request's method.
    discovery: Option<DiscoveryEngine>,
    prober: Arc<dyn Prober>,
    vendors: Arc<dyn VendorRepository>,
    hostnames: Arc<dyn HostnameResolver>,
    fingerprint: Arc<FingerprintEngine>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
            discovery: None,
            prober: Arc::new(TcpConnectProber),
            vendors: Arc::new(MacOuiRepo),
            hostnames: Arc::new(ReverseDns),
            fingerprint: Arc::new(FingerprintEngine::default()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryEngine) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_vendor_repository(mut self, vendors: Arc<dyn VendorRepository>) -> Self {
        self.vendors = vendors;
        self
    }

    pub fn with_hostname_resolver(mut self, hostnames: Arc<dyn HostnameResolver>) -> Self {
        self.hostnames = hostnames;
        self
    }

    pub fn with_fingerprint_engine(mut self, engine: FingerprintEngine) -> Self {
        self.fingerprint = Arc::new(engine);
        self
    }

    /// Validates the request, resolves the network context and starts the
    /// scan pipeline in the background.
    ///
    /// Configuration and resolution failures are returned here, before any
    /// probe is sent. Everything after that is reported through the handle.
    pub async fn start_scan(&self, request: ScanRequest) -> Result<SessionHandle, ScanError> {
        let ScanRequest {
            context_override,
            config,
        } = request;
        config.validate()?;

        let session = ScanSession::new(config.clone());
        session.transition(ScanState::Resolving);

        let ctx = match context_override {
            Some(ctx) => ctx,
            None => {
                let resolver = self.resolver.clone();
                tokio::task::spawn_blocking(move || resolver.resolve())
                    .await
                    .map_err(|e| ScanError::Resolution(e.to_string()))??
            }
        };
        info!("Scanning {ctx}");

        session.set_context(ctx.clone());
        session.transition(ScanState::Discovering);

        let discovery = self
            .discovery
            .clone()
            .unwrap_or_else(|| DiscoveryEngine::for_method(config.method));

        let pipeline = Arc::new(Pipeline {
            session: session.clone(),
            ctx,
            discovery,
            scanner: PortScanner::new(self.prober.clone(), &config),
            vendors: self.vendors.clone(),
            hostnames: self.hostnames.clone(),
            fingerprint: self.fingerprint.clone(),
            remaining: AtomicUsize::new(0),
        });
        tokio::spawn(pipeline.run());

        Ok(SessionHandle::new(session))
    }

    pub fn cancel_scan(&self, handle: &SessionHandle) {
        handle.cancel();
    }

    pub fn snapshot(&self, handle: &SessionHandle) -> Vec<Device> {
        handle.snapshot()
    }

    /// Scans `range` on one host of the session and merges the result into it.
    ///
    /// The host does not have to be part of the session yet; it is added if
    /// missing. The rescan has its own cancellation, so it still runs after
    /// the session finished or was cancelled.
    pub async fn scan_ports_for_device(
        &self,
        handle: &SessionHandle,
        addr: IpAddr,
        range: PortRange,
    ) -> Result<BTreeSet<u16>, ScanError> {
        let session = handle.session();
        let scanner = PortScanner::new(self.prober.clone(), session.config());

        let lock = session.host_lock(addr);
        let _guard = lock.lock().await;

        let report = scanner.scan_ports(addr, range, &CancellationToken::new()).await?;
        let hostname = if session.config().resolve_hostnames {
            self.hostnames.lookup(addr).await
        } else {
            None
        };

        apply_report(session, addr, &report, hostname);
        fingerprint_host(session, &self.fingerprint, addr);

        Ok(report.open)
    }
}

struct Pipeline {
    session: Arc<ScanSession>,
    ctx: NetworkContext,
    discovery: DiscoveryEngine,
    scanner: PortScanner,
    vendors: Arc<dyn VendorRepository>,
    hostnames: Arc<dyn HostnameResolver>,
    fingerprint: Arc<FingerprintEngine>,
    /// Hosts whose port scan has not finished yet.
    remaining: AtomicUsize,
}

impl Pipeline {
    async fn run(self: Arc<Self>) {
        let cancel = self.session.cancel_token();
        let config = self.session.config().clone();

        let hosts = self.discover(&config, &cancel).await;

        if !cancel.is_cancelled() {
            self.session.transition(ScanState::Scanning);
            if hosts.is_empty() {
                self.session.transition(ScanState::Fingerprinting);
            }
        }
        self.remaining.store(hosts.len(), Ordering::SeqCst);

        let pipeline = self.clone();
        let started_all = bounded_fan_out(
            hosts,
            config.host_concurrency,
            &cancel,
            move |ip| {
                let pipeline = pipeline.clone();
                async move { pipeline.scan_host(ip).await }
            },
            |_| {},
        )
        .await;

        let summary = self.session.summary();
        if cancel.is_cancelled() {
            warn!(
                "Scan cancelled with {} devices and {} open ports recorded",
                summary.total_devices, summary.total_open_ports
            );
            self.session.finish(ScanState::Cancelled);
        } else {
            debug!(started_all, "host fan-out finished");
            success!(
                "Scan complete: {} devices, {} alive, {} open ports",
                summary.total_devices, summary.alive_devices, summary.total_open_ports
            );
            self.session.finish(ScanState::Completed);
        }
    }

    /// Runs discovery to the end and returns the hosts to port scan, in
    /// discovery order.
    async fn discover(&self, config: &ScanConfig, cancel: &CancellationToken) -> Vec<IpAddr> {
        let settings = ProbeSettings {
            timeout: config.timeout,
            concurrency: config.port_concurrency,
        };
        let warm_vendors = config.lookup_vendors.then(|| {
            let vendors = self.vendors.clone();
            tokio::task::spawn_blocking(move || vendors.preload())
        });

        let mut discovery = self.discovery.discover(&self.ctx, settings, cancel.clone()).await;
        match discovery.strategy() {
            Some(name) => self.session.set_strategy(name),
            None => warn!("No discovery strategy available, scanning gateway and local host only"),
        }

        if let Some(warm) = warm_vendors
            && let Err(e) = warm.await
        {
            debug!("vendor database preload failed: {e}");
        }

        let mut hosts = Vec::new();
        while let Some(found) = discovery.next().await {
            self.record(config, &found);
            hosts.push(IpAddr::V4(found.addr));
        }
        info!("Discovery finished with {} hosts", hosts.len());
        hosts
    }

    fn record(&self, config: &ScanConfig, found: &DiscoveredHost) {
        let role = if Some(found.addr) == self.ctx.gateway() {
            Some(NetworkRole::Gateway)
        } else if found.addr == self.ctx.local_addr() {
            Some(NetworkRole::LocalHost)
        } else {
            None
        };
        let is_local = role == Some(NetworkRole::LocalHost);

        let mac = found.mac.or_else(|| self.ctx.local_mac().filter(|_| is_local));
        let vendor = match mac {
            Some(mac) if config.lookup_vendors => self.vendors.get_vendor(mac),
            _ => None,
        };

        self.session.update_device(IpAddr::V4(found.addr), |device| {
            let mut changed = device.merge_mac(mac);
            changed |= device.merge_vendor(vendor);
            changed |= device.set_ttl(found.ttl);
            if let Some(role) = role {
                changed |= device.set_role(role);
            }
            if found.responded || is_local {
                changed |= device.mark_alive();
            } else {
                changed |= device.mark_unreachable();
            }
            changed
        });
    }

    async fn scan_host(&self, ip: IpAddr) {
        let cancel = self.session.cancel_token();
        let config = self.session.config();

        let lock = self.session.host_lock(ip);
        let _guard = lock.lock().await;
        if cancel.is_cancelled() {
            return;
        }

        self.session
            .update_device(ip, |device| device.advance_phase(HostPhase::Scanning));

        let ports = self.scanner.scan_ports(ip, config.port_range, &cancel);
        let hostname = async {
            if config.resolve_hostnames {
                self.hostnames.lookup(ip).await
            } else {
                None
            }
        };
        let (report, hostname) = tokio::join!(ports, hostname);

        match report {
            Ok(report) => apply_report(&self.session, ip, &report, hostname),
            Err(e) => {
                debug!(host = %ip, "port scan failed: {e}");
                self.session.update_device(ip, |device| {
                    let mut changed = device.merge_hostname(hostname);
                    changed |= device.mark_unreachable();
                    changed |= device.advance_phase(HostPhase::Scanned);
                    changed
                });
            }
        }

        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.session.transition(ScanState::Fingerprinting);
        }

        fingerprint_host(&self.session, &self.fingerprint, ip);
    }
}

fn apply_report(session: &ScanSession, ip: IpAddr, report: &PortScanReport, hostname: Option<String>) {
    session.update_device(ip, |device| {
        let mut changed = device.add_ports(report.open.iter().copied());
        changed |= device.add_banners(report.banners.clone());
        changed |= device.merge_hostname(hostname);
        if !report.open.is_empty() {
            changed |= device.mark_alive();
        }
        changed |= device.advance_phase(HostPhase::Scanned);
        changed
    });
}

fn fingerprint_host(session: &ScanSession, engine: &FingerprintEngine, ip: IpAddr) {
    let Some(device) = session.device(ip) else {
        return;
    };
    let guess = engine.identify(&FingerprintInput {
        ttl: device.ttl(),
        open_ports: device.open_ports(),
        banners: device.banners(),
    });

    session.update_device(ip, |device| {
        let os_changed = device.set_os(guess);
        let phase_changed = device.advance_phase(HostPhase::Fingerprinted);
        os_changed || phase_changed
    });
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
