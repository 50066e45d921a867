use std::net::IpAddr;

use async_trait::async_trait;
use lanscope_common::debug;

/// Best-effort name lookups for discovered hosts.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn lookup(&self, addr: IpAddr) -> Option<String>;
}

/// PTR lookups through the system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseDns;

#[async_trait]
impl HostnameResolver for ReverseDns {
    async fn lookup(&self, addr: IpAddr) -> Option<String> {
        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .ok()?;
        match name {
            // Resolvers without a PTR record echo the address back.
            Ok(name) if name != addr.to_string() => Some(name.trim_end_matches('.').to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!("reverse lookup for {addr} failed: {e}");
                None
            }
        }
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
