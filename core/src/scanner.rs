//! TCP connect port scanning.
//!
//! A port is open iff a full handshake completes within the probe timeout.
//! Refusals, timeouts and unreachable errors all collapse into "not open";
//! the only error a scan can return is a target that is not a probe-able
//! address in the first place.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanscope_common::config::ScanConfig;
use lanscope_common::debug;
use lanscope_common::error::ScanError;
use lanscope_common::network::range::PortRange;
use lanscope_common::network::services::is_http_port;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::network::fanout::bounded_fan_out;

/// Ports whose services usually identify themselves on connect (or after a
/// trivial request).
pub const BANNER_PORTS: [u16; 9] = [21, 22, 23, 25, 80, 110, 143, 443, 8080];
const BANNER_READ_LIMIT: usize = 1024;
const HTTP_PROBE: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed,
    TimedOut,
}

/// The network side of a port scan, split out so scans can run against
/// scripted hosts.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> ProbeOutcome;

    /// Reads whatever the service volunteers. `None` on any failure.
    async fn banner(&self, addr: SocketAddr, timeout: Duration) -> Option<String>;
}

/// Plain `connect(2)` prober. Needs no privileges.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProber;

#[async_trait]
impl Prober for TcpConnectProber {
    async fn connect(&self, addr: SocketAddr, probe_timeout: Duration) -> ProbeOutcome {
        match timeout(probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Open,
            Ok(Err(_)) => ProbeOutcome::Closed,
            Err(_elapsed) => ProbeOutcome::TimedOut,
        }
    }

    async fn banner(&self, addr: SocketAddr, banner_timeout: Duration) -> Option<String> {
        let read = async {
            let mut stream = TcpStream::connect(addr).await.ok()?;
            if is_http_port(addr.port()) {
                stream.write_all(HTTP_PROBE).await.ok()?;
            }
            let mut buf = vec![0u8; BANNER_READ_LIMIT];
            let n = stream.read(&mut buf).await.ok()?;
            let text = String::from_utf8_lossy(&buf[..n]).trim().to_string();
            (!text.is_empty()).then_some(text)
        };
        timeout(banner_timeout, read).await.ok().flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortScanReport {
    pub open: BTreeSet<u16>,
    pub banners: BTreeMap<u16, String>,
    /// `false` when cancellation stopped the scan before every port was probed.
    /// The ports found up to that point are still valid.
    pub complete: bool,
}

#[derive(Clone)]
pub struct PortScanner {
    prober: Arc<dyn Prober>,
    timeout: Duration,
    concurrency: usize,
    grab_banners: bool,
    banner_timeout: Duration,
    max_banner_ports: usize,
}

impl PortScanner {
    pub fn new(prober: Arc<dyn Prober>, config: &ScanConfig) -> Self {
        Self {
            prober,
            timeout: config.timeout,
            concurrency: config.port_concurrency,
            grab_banners: config.grab_banners,
            banner_timeout: config.banner_timeout,
            max_banner_ports: config.max_banner_ports,
        }
    }

    /// Probes every port of `range` on `addr`, at most `concurrency` at a time.
    pub async fn scan_ports(
        &self,
        addr: IpAddr,
        range: PortRange,
        cancel: &CancellationToken,
    ) -> Result<PortScanReport, ScanError> {
        if !is_probeable(addr) {
            return Err(ScanError::TargetUnreachable(addr.to_string()));
        }

        let mut open = BTreeSet::new();
        let complete = bounded_fan_out(
            range,
            self.concurrency,
            cancel,
            |port| {
                let prober = self.prober.clone();
                let probe_timeout = self.timeout;
                async move {
                    let outcome = prober.connect(SocketAddr::new(addr, port), probe_timeout).await;
                    (port, outcome)
                }
            },
            |(port, outcome)| {
                if outcome == ProbeOutcome::Open {
                    open.insert(port);
                }
            },
        )
        .await;

        debug!("{addr}: {} open in {range}", open.len());

        let banners = if self.grab_banners && !cancel.is_cancelled() {
            self.collect_banners(addr, &open, cancel).await
        } else {
            BTreeMap::new()
        };

        Ok(PortScanReport {
            open,
            banners,
            complete,
        })
    }

    async fn collect_banners(
        &self,
        addr: IpAddr,
        open: &BTreeSet<u16>,
        cancel: &CancellationToken,
    ) -> BTreeMap<u16, String> {
        let ports: Vec<u16> = BANNER_PORTS
            .iter()
            .copied()
            .filter(|p| open.contains(p))
            .take(self.max_banner_ports)
            .collect();

        let mut banners = BTreeMap::new();
        bounded_fan_out(
            ports,
            self.max_banner_ports,
            cancel,
            |port| {
                let prober = self.prober.clone();
                let banner_timeout = self.banner_timeout;
                async move { (port, prober.banner(SocketAddr::new(addr, port), banner_timeout).await) }
            },
            |(port, banner)| {
                if let Some(text) = banner {
                    banners.insert(port, text);
                }
            },
        )
        .await;
        banners
    }
}

fn is_probeable(addr: IpAddr) -> bool {
    let broadcast = matches!(addr, IpAddr::V4(v4) if v4.is_broadcast());
    !(addr.is_unspecified() || addr.is_multicast() || broadcast)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
