use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lanscope_common::network::context::NetworkContext;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DiscoveredHost, DiscoveryStrategy, ProbeSettings, RESULT_BUFFER};
use crate::network::fanout::bounded_fan_out;

const PAYLOAD: [u8; 56] = [0; 56];

/// Concurrent echo sweep. Reports the TTL of every reply so the fingerprint
/// engine can bucket it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpDiscovery;

#[async_trait]
impl DiscoveryStrategy for IcmpDiscovery {
    fn name(&self) -> &'static str {
        "icmp"
    }

    async fn probe(
        &self,
        ctx: &NetworkContext,
        settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>> {
        let client = Arc::new(Client::new(&Config::default()).context("opening ICMP socket")?);
        let local = ctx.local_addr();
        let targets: Vec<Ipv4Addr> = ctx.candidate_hosts().to_iter().filter(|ip| *ip != local).collect();
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);

        tokio::spawn(async move {
            bounded_fan_out(
                targets,
                settings.concurrency,
                &cancel,
                |ip| {
                    let client = client.clone();
                    let tx = tx.clone();
                    async move {
                        if let Some(ttl) = ping(&client, ip, settings.timeout).await {
                            let _ = tx.send(DiscoveredHost::responder(ip).with_ttl(ttl)).await;
                        }
                    }
                },
                |_| {},
            )
            .await;
        });

        Ok(rx)
    }
}

/// `Some(ttl)` when `ip` answered; the TTL itself may be missing.
async fn ping(client: &Client, ip: Ipv4Addr, timeout: Duration) -> Option<Option<u8>> {
    let mut pinger = client.pinger(IpAddr::V4(ip), PingIdentifier(rand::random())).await;
    pinger.timeout(timeout);
    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((IcmpPacket::V4(reply), _rtt)) => Some(reply.get_ttl()),
        Ok((IcmpPacket::V6(_), _rtt)) => Some(None),
        Err(_) => None,
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
