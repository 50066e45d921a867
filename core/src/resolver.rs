//! Works out where this machine sits on the LAN before a scan starts.

use std::net::Ipv4Addr;

use lanscope_common::error::ScanError;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::network::interface::{
    NetworkInterfaceExtension, route_source_ip, select_lan_interface,
};
use lanscope_common::{debug, warn};
use pnet::datalink;

/// Anything that can tell the orchestrator which subnet to scan.
///
/// Implementations only read system state, so calling `resolve` twice in a
/// row yields the same context on an unchanged machine.
pub trait ContextResolver: Send + Sync {
    fn resolve(&self) -> Result<NetworkContext, ScanError>;
}

/// Reads interfaces through pnet and the default route from the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl ContextResolver for SystemResolver {
    fn resolve(&self) -> Result<NetworkContext, ScanError> {
        resolve()
    }
}

// Any public address works; nothing is sent.
const ROUTE_PROBE: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

pub fn resolve() -> Result<NetworkContext, ScanError> {
    let route_source = route_source_ip(ROUTE_PROBE);
    let interface = select_lan_interface(datalink::interfaces(), route_source).ok_or_else(|| {
        ScanError::Resolution("no active network interface with an IPv4 address".into())
    })?;

    let network = interface.ipv4_network().ok_or_else(|| {
        ScanError::Resolution(format!("{} has no IPv4 address", interface.name))
    })?;

    debug!("Selected {} ({network}) for scanning", interface.name);

    let gateway = default_gateway(&interface.name);
    if gateway.is_none() {
        warn!("No default gateway found for {}", interface.name);
    }

    Ok(NetworkContext::new(network.ip(), network)
        .map_err(|e| ScanError::Resolution(e.to_string()))?
        .with_gateway(gateway)
        .with_mac(interface.mac)
        .with_interface(interface.name))
}

#[cfg(target_os = "linux")]
fn default_gateway(interface: &str) -> Option<Ipv4Addr> {
    let table = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_proc_route(&table, interface)
}

#[cfg(not(target_os = "linux"))]
fn default_gateway(_interface: &str) -> Option<Ipv4Addr> {
    let output = std::process::Command::new("route")
        .args(["-n", "get", "default"])
        .output()
        .ok()?;
    parse_route_get(&String::from_utf8_lossy(&output.stdout))
}

const RTF_GATEWAY: u16 = 0x2;

/// Finds the default route in a `/proc/net/route` dump.
///
/// Routes on `interface` win over default routes on other links.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_route(table: &str, interface: &str) -> Option<Ipv4Addr> {
    let mut fallback = None;

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [iface, destination, gateway, flags, ..] = fields.as_slice() else {
            continue;
        };
        if *destination != "00000000" {
            continue;
        }
        let Ok(flags) = u16::from_str_radix(flags, 16) else {
            continue;
        };
        if flags & RTF_GATEWAY == 0 {
            continue;
        }
        let Ok(raw) = u32::from_str_radix(gateway, 16) else {
            continue;
        };
        // The kernel prints the address in host byte order.
        let addr = Ipv4Addr::from(raw.to_ne_bytes());

        if *iface == interface {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }

    fallback
}

/// Pulls the gateway out of `route -n get default` output.
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("gateway:"))
        .find_map(|gw| gw.trim().parse().ok())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
