use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, ensure};
use async_trait::async_trait;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::{debug, warn};
use lanscope_protocols::arp;
use pnet::datalink::{self, DataLinkSender};
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DiscoveredHost, DiscoveryStrategy, ProbeSettings, RESULT_BUFFER};
use crate::network::channel::{self, EthernetHandle};

/// Replies trickle in well after the last request leaves, so the listen
/// window never drops below this even with a short probe timeout.
const MIN_LISTEN_WINDOW: Duration = Duration::from_secs(1);

/// Broadcasts an ARP request for every candidate address and reports each
/// reply with the responder's MAC.
#[derive(Debug, Clone)]
pub struct ArpDiscovery {
    min_listen: Duration,
}

impl Default for ArpDiscovery {
    fn default() -> Self {
        Self {
            min_listen: MIN_LISTEN_WINDOW,
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for ArpDiscovery {
    fn name(&self) -> &'static str {
        "arp"
    }

    async fn probe(
        &self,
        ctx: &NetworkContext,
        settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>> {
        ensure!(is_root::is_root(), "ARP needs raw socket privileges");
        let name = ctx.interface().context("no interface recorded for this network")?;
        let src_mac = ctx.local_mac().context("interface has no MAC address")?;
        let intf = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == name)
            .with_context(|| format!("interface {name} disappeared"))?;
        ensure!(
            intf.is_broadcast() && !intf.is_point_to_point(),
            "{name} is not on a broadcast LAN"
        );

        let stop = cancel.child_token();
        let handle = channel::start_capture(&intf, stop.clone())?;

        let sweep = Sweep {
            src_mac,
            src_ip: ctx.local_addr(),
            subnet: ctx.subnet(),
            targets: ctx
                .candidate_hosts()
                .to_iter()
                .filter(|ip| *ip != ctx.local_addr())
                .collect(),
            window: settings.timeout.max(self.min_listen),
        };

        let (tx, rx) = mpsc::channel(RESULT_BUFFER);
        tokio::spawn(sweep.run(handle, stop, tx));
        Ok(rx)
    }
}

struct Sweep {
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    subnet: Ipv4Network,
    targets: Vec<Ipv4Addr>,
    window: Duration,
}

impl Sweep {
    async fn run(self, handle: EthernetHandle, stop: CancellationToken, out: mpsc::Sender<DiscoveredHost>) {
        let EthernetHandle { tx: mut sender, rx: mut frames } = handle;
        let Sweep {
            src_mac,
            src_ip,
            subnet,
            targets,
            window,
        } = self;

        let send_stop = stop.clone();
        let sent = tokio::task::spawn_blocking(move || {
            send_requests(sender.as_mut(), src_mac, src_ip, &targets, &send_stop)
        })
        .await;
        match sent {
            Ok(count) => debug!("Sent {count} ARP requests"),
            Err(e) => warn!("ARP sender task failed: {e}"),
        }

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = &mut deadline => break,
                frame = frames.recv() => {
                    let Some(bytes) = frame else { break };
                    let Some(reply) = arp::parse_reply(&bytes) else { continue };
                    if !subnet.contains(reply.ip) || reply.ip == src_ip {
                        continue;
                    }
                    let host = DiscoveredHost::responder(reply.ip).with_mac(reply.mac);
                    if out.send(host).await.is_err() {
                        break;
                    }
                }
            }
        }

        stop.cancel();
    }
}

fn send_requests(
    sender: &mut dyn DataLinkSender,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    targets: &[Ipv4Addr],
    stop: &CancellationToken,
) -> usize {
    let mut sent = 0;
    for &target in targets {
        if stop.is_cancelled() {
            break;
        }
        let frame = match arp::create_request(src_mac, src_ip, target) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Skipping ARP request for {target}: {e}");
                continue;
            }
        };
        match sender.send_to(&frame, None) {
            Some(Ok(())) => sent += 1,
            Some(Err(e)) => debug!("ARP send to {target} failed: {e}"),
            None => {}
        }
    }
    sent
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
