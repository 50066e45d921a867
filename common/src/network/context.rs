use std::fmt;
use std::net::Ipv4Addr;

use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;

use crate::error::ScanError;
use crate::network::range::{Ipv4Range, host_range};

/// Where the scanning host sits on the LAN.
///
/// Built once per session and never mutated afterwards; a new session
/// resolves a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    local_addr: Ipv4Addr,
    subnet: Ipv4Network,
    gateway: Option<Ipv4Addr>,
    local_mac: Option<MacAddr>,
    interface: Option<String>,
}

impl NetworkContext {
    /// `local_addr` must fall inside `subnet`. The subnet is normalized to its
    /// network address, so `192.168.1.77/24` and `192.168.1.0/24` are equal.
    pub fn new(local_addr: Ipv4Addr, subnet: Ipv4Network) -> Result<Self, ScanError> {
        let subnet = Ipv4Network::new(subnet.network(), subnet.prefix())
            .map_err(|e| ScanError::InvalidConfig(e.to_string()))?;

        if !subnet.contains(local_addr) {
            return Err(ScanError::InvalidConfig(format!(
                "local address {local_addr} is outside {subnet}"
            )));
        }

        Ok(Self {
            local_addr,
            subnet,
            gateway: None,
            local_mac: None,
            interface: None,
        })
    }

    /// Gateways outside the subnet are dropped; they could never be probed
    /// on the link.
    pub fn with_gateway(mut self, gateway: Option<Ipv4Addr>) -> Self {
        self.gateway = gateway.filter(|gw| self.subnet.contains(*gw) && *gw != self.local_addr);
        self
    }

    pub fn with_mac(mut self, mac: Option<MacAddr>) -> Self {
        self.local_mac = mac;
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }

    pub fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    pub fn subnet(&self) -> Ipv4Network {
        self.subnet
    }

    pub fn gateway(&self) -> Option<Ipv4Addr> {
        self.gateway
    }

    pub fn local_mac(&self) -> Option<MacAddr> {
        self.local_mac
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Every address discovery should probe.
    pub fn candidate_hosts(&self) -> Ipv4Range {
        host_range(&self.subnet)
    }

    pub fn host_count(&self) -> usize {
        self.candidate_hosts().len()
    }
}

impl fmt::Display for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.local_addr, self.subnet)?;
        if let Some(gw) = self.gateway {
            write!(f, " via {gw}")?;
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    #[test]
    fn subnet_is_normalized() {
        let ctx = NetworkContext::new(Ipv4Addr::new(192, 168, 1, 77), net("192.168.1.77/24")).unwrap();
        assert_eq!(ctx.subnet().ip(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(ctx.subnet().prefix(), 24);
    }

    #[test]
    fn local_address_must_be_inside_subnet() {
        let res = NetworkContext::new(Ipv4Addr::new(10, 0, 0, 5), net("192.168.1.0/24"));
        assert!(matches!(res, Err(ScanError::InvalidConfig(_))));
    }

    #[test]
    fn foreign_gateway_is_dropped() {
        let ctx = NetworkContext::new(Ipv4Addr::new(192, 168, 1, 10), net("192.168.1.0/24"))
            .unwrap()
            .with_gateway(Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(ctx.gateway(), None);

        let ctx = ctx.with_gateway(Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(ctx.gateway(), Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn candidate_hosts_exclude_network_and_broadcast() {
        let ctx = NetworkContext::new(Ipv4Addr::new(192, 168, 1, 10), net("192.168.1.0/24")).unwrap();
        let hosts: Vec<Ipv4Addr> = ctx.candidate_hosts().to_iter().collect();
        assert_eq!(hosts.len(), 254);
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 255)));
        assert_eq!(ctx.host_count(), 254);
    }

    #[test]
    fn display_mentions_gateway() {
        let ctx = NetworkContext::new(Ipv4Addr::new(192, 168, 1, 10), net("192.168.1.0/24"))
            .unwrap()
            .with_gateway(Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(ctx.to_string(), "192.168.1.10 in 192.168.1.0/24 via 192.168.1.1");
    }
}
