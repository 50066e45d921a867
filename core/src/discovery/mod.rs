//! Host discovery: finding which addresses of a subnet answer.
//!
//! Each technique is a [`DiscoveryStrategy`]. The [`DiscoveryEngine`] walks an
//! ordered chain of them and uses the first one that can run here, so a
//! machine without raw socket access quietly degrades from ARP to ICMP to a
//! plain TCP handshake sweep.

mod arp;
mod handshake;
mod icmp;

use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanscope_common::config::ScanMethod;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::{debug, info};
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use arp::ArpDiscovery;
pub use handshake::HandshakeDiscovery;
pub use icmp::IcmpDiscovery;

/// Buffer between a running strategy and the consumer of its results.
pub(crate) const RESULT_BUFFER: usize = 256;

/// A single discovery observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub addr: Ipv4Addr,
    pub mac: Option<MacAddr>,
    pub ttl: Option<u8>,
    /// `false` for the local host and gateway when they stayed silent but are
    /// reported anyway.
    pub responded: bool,
}

impl DiscoveredHost {
    pub fn responder(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            mac: None,
            ttl: None,
            responded: true,
        }
    }

    pub fn silent(addr: Ipv4Addr) -> Self {
        Self {
            responded: false,
            ..Self::responder(addr)
        }
    }

    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn with_ttl(mut self, ttl: Option<u8>) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub concurrency: usize,
}

/// One way of probing a subnet and reporting responders.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts probing `ctx`'s subnet in the background and returns the stream
    /// of responders. The stream ends once every candidate was probed or
    /// `cancel` fired.
    ///
    /// An `Err` means the strategy cannot run on this machine at all (missing
    /// privileges, no link-layer access) and the next one should be tried.
    async fn probe(
        &self,
        ctx: &NetworkContext,
        settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>>;
}

/// An ordered fallback chain of discovery strategies.
#[derive(Clone)]
pub struct DiscoveryEngine {
    chain: Vec<Arc<dyn DiscoveryStrategy>>,
}

impl DiscoveryEngine {
    /// The default chain for `method`: the requested technique first, then
    /// every technique that needs fewer privileges.
    pub fn for_method(method: ScanMethod) -> Self {
        let mut chain: Vec<Arc<dyn DiscoveryStrategy>> = Vec::new();
        if method == ScanMethod::Arp {
            chain.push(Arc::new(ArpDiscovery::default()));
        }
        chain.push(Arc::new(IcmpDiscovery));
        chain.push(Arc::new(HandshakeDiscovery::default()));
        Self { chain }
    }

    pub fn with_chain(chain: Vec<Arc<dyn DiscoveryStrategy>>) -> Self {
        Self { chain }
    }

    pub async fn discover(
        &self,
        ctx: &NetworkContext,
        settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> Discovery {
        let mut discovery = Discovery::new(ctx, cancel.clone());

        for strategy in &self.chain {
            match strategy.probe(ctx, settings, cancel.clone()).await {
                Ok(rx) => {
                    info!("Discovering hosts on {} via {}", ctx.subnet(), strategy.name());
                    discovery.rx = Some(rx);
                    discovery.strategy = Some(strategy.name());
                    break;
                }
                Err(e) => debug!("{} discovery unavailable: {e:#}", strategy.name()),
            }
        }

        discovery
    }
}

/// The lazy, finite result sequence of one discovery run.
///
/// Responders are yielded as they arrive, each address at most once and only
/// if it lies inside the scanned subnet. Once the strategy is exhausted (or
/// cancelled) the gateway and local host follow as silent entries if they
/// never answered.
pub struct Discovery {
    rx: Option<mpsc::Receiver<DiscoveredHost>>,
    strategy: Option<&'static str>,
    subnet: Ipv4Network,
    seen: HashSet<Ipv4Addr>,
    anchors: VecDeque<Ipv4Addr>,
    cancel: CancellationToken,
}

impl Discovery {
    fn new(ctx: &NetworkContext, cancel: CancellationToken) -> Self {
        let anchors = ctx
            .gateway()
            .into_iter()
            .chain(std::iter::once(ctx.local_addr()))
            .collect();

        Self {
            rx: None,
            strategy: None,
            subnet: ctx.subnet(),
            seen: HashSet::new(),
            anchors,
            cancel,
        }
    }

    /// Name of the strategy that actually ran, `None` if every one was unavailable.
    pub fn strategy(&self) -> Option<&'static str> {
        self.strategy
    }

    /// Next responder, or anchor once the strategy is done.
    ///
    /// After a cancel the strategy is no longer awaited, but responders it
    /// already buffered are still handed out.
    pub async fn next(&mut self) -> Option<DiscoveredHost> {
        while let Some(rx) = self.rx.as_mut() {
            let received = if self.cancel.is_cancelled() {
                rx.try_recv().ok()
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => continue,
                    host = rx.recv() => host,
                }
            };
            match received {
                Some(host) if self.accepts(&host) => return Some(host),
                Some(_) => continue,
                None => self.rx = None,
            }
        }

        while let Some(addr) = self.anchors.pop_front() {
            if self.seen.insert(addr) {
                return Some(DiscoveredHost::silent(addr));
            }
        }
        None
    }

    fn accepts(&mut self, host: &DiscoveredHost) -> bool {
        self.subnet.contains(host.addr) && self.seen.insert(host.addr)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
