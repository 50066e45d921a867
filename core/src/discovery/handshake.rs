use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use lanscope_common::network::context::NetworkContext;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::{DiscoveredHost, DiscoveryStrategy, ProbeSettings, RESULT_BUFFER};
use crate::network::fanout::bounded_fan_out;

const PROBE_PORT: u16 = 443;

/// Last-resort discovery that needs no privileges at all: a TCP connect to a
/// single port. A completed handshake or an immediate refusal both prove a
/// host is there; only silence counts as absent.
#[derive(Debug, Clone)]
pub struct HandshakeDiscovery {
    port: u16,
}

impl HandshakeDiscovery {
    pub fn on_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for HandshakeDiscovery {
    fn default() -> Self {
        Self::on_port(PROBE_PORT)
    }
}

#[async_trait]
impl DiscoveryStrategy for HandshakeDiscovery {
    fn name(&self) -> &'static str {
        "tcp-handshake"
    }

    async fn probe(
        &self,
        ctx: &NetworkContext,
        settings: ProbeSettings,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveredHost>> {
        let local = ctx.local_addr();
        let targets: Vec<Ipv4Addr> = ctx.candidate_hosts().to_iter().filter(|ip| *ip != local).collect();
        let port = self.port;
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);

        tokio::spawn(async move {
            bounded_fan_out(
                targets,
                settings.concurrency,
                &cancel,
                |ip| {
                    let tx = tx.clone();
                    async move {
                        let addr = SocketAddr::new(IpAddr::V4(ip), port);
                        if handshake_probe(addr, settings.timeout).await {
                            let _ = tx.send(DiscoveredHost::responder(ip)).await;
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

pub(crate) async fn handshake_probe(addr: SocketAddr, probe_timeout: Duration) -> bool {
    match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => e.kind() == ErrorKind::ConnectionRefused,
        Err(_elapsed) => false,
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
