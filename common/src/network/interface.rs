use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::{IpNetwork, Ipv4Network};

#[cfg(target_os = "linux")]
use linux_impl::{is_physical, is_wireless};
#[cfg(not(target_os = "linux"))]
use fallback_impl::{is_physical, is_wireless};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    IsLoopback,
    /// Discovery sweeps an IPv4 subnet, so one must be assigned.
    NoIpv4,
}

pub trait NetworkInterfaceExtension {
    /// The first IPv4 network assigned to this interface.
    fn ipv4_network(&self) -> Option<Ipv4Network>;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn ipv4_network(&self) -> Option<Ipv4Network> {
        self.ips.iter().find_map(|net| match net {
            IpNetwork::V4(v4) if !v4.ip().is_loopback() && !v4.ip().is_unspecified() => Some(*v4),
            _ => None,
        })
    }
}

/// How well an interface suits a LAN sweep. Lower is better.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
enum LanRank {
    Wired,
    Wireless,
    /// Bridges, veths and other software NICs that still sit on a broadcast LAN.
    Virtual,
    /// No MAC, no broadcast or point-to-point: only the unprivileged sweeps work.
    Routed,
}

/// Picks the interface a LAN scan should run on.
///
/// Every interface that is up, not loopback and has an IPv4 address
/// qualifies. When `route_source` is known (the address the kernel uses to
/// reach the outside world) the interface holding it wins. Otherwise wired
/// beats wireless, which beats virtual, which beats tunnels.
pub fn select_lan_interface(
    interfaces: Vec<NetworkInterface>,
    route_source: Option<Ipv4Addr>,
) -> Option<NetworkInterface> {
    let viable: Vec<NetworkInterface> = interfaces
        .into_iter()
        .filter(|iface| is_viable_lan_interface(iface).is_ok())
        .collect();

    if let Some(src) = route_source
        && let Some(iface) = viable
            .iter()
            .find(|iface| iface.ips.iter().any(|net| net.ip() == IpAddr::V4(src)))
    {
        return Some(iface.clone());
    }

    select_best_lan_interface(viable, |iface| lan_rank(iface, is_physical, is_wireless))
}

/// Asks the kernel which local address it would use to reach `target`.
///
/// Connecting a UDP socket sends nothing; it only runs the route lookup.
pub fn route_source_ip(target: Ipv4Addr) -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((target, 53)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Some(v4),
        _ => None,
    }
}

fn is_viable_lan_interface(interface: &NetworkInterface) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if interface.ipv4_network().is_none() {
        return Err(ViabilityError::NoIpv4);
    }
    Ok(())
}

fn lan_rank(
    interface: &NetworkInterface,
    is_physical: impl Fn(&NetworkInterface) -> bool,
    is_wireless: impl Fn(&NetworkInterface) -> bool,
) -> LanRank {
    let link_layer = interface.mac.is_some() && interface.is_broadcast() && !interface.is_point_to_point();
    match (link_layer, is_physical(interface)) {
        (false, _) => LanRank::Routed,
        (true, false) => LanRank::Virtual,
        (true, true) if is_wireless(interface) => LanRank::Wireless,
        (true, true) => LanRank::Wired,
    }
}

fn select_best_lan_interface(
    interfaces: Vec<NetworkInterface>,
    rank: impl Fn(&NetworkInterface) -> LanRank,
) -> Option<NetworkInterface> {
    interfaces.into_iter().min_by_key(rank)
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/device", interface.name)).exists()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
    }
}

// No cheap hardware probe elsewhere; trust the interface flags.
#[cfg(not(target_os = "linux"))]
mod fallback_impl {
    use super::*;

    pub fn is_physical(_interface: &NetworkInterface) -> bool {
        true
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        interface.name.starts_with("wl")
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
