use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use pnet::util::MacAddr;

use crate::network::services::service_name;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    #[default]
    Unknown,
    Alive,
    Unreachable,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Alive => "alive",
            Self::Unreachable => "unreachable",
        })
    }
}

/// Operating system families the fingerprint engine can tell apart.
///
/// The declaration order doubles as the last tie-breaker when two families
/// collect identical votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsFamily {
    Windows,
    Unix,
    Apple,
    NetworkAppliance,
    Unknown,
}

impl OsFamily {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Windows => "Windows-family",
            Self::Unix => "Unix-family",
            Self::Apple => "Apple-family",
            Self::NetworkAppliance => "Network-appliance-family",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OsGuess {
    pub family: OsFamily,
    /// Share of the accumulated vote the winning family got, in `[0, 1]`.
    pub confidence: f64,
}

impl OsGuess {
    pub fn new(family: OsFamily, confidence: f64) -> Self {
        Self {
            family,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown() -> Self {
        Self {
            family: OsFamily::Unknown,
            confidence: 0.0,
        }
    }

    pub fn label(&self) -> &'static str {
        self.family.label()
    }

    pub fn is_unknown(&self) -> bool {
        self.family == OsFamily::Unknown
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum NetworkRole {
    Gateway,
    LocalHost,
}

/// How far a device has progressed through the scan pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostPhase {
    #[default]
    Discovered,
    Scanning,
    Scanned,
    Fingerprinted,
}

/// One host as seen by a scan session.
///
/// The address is fixed at creation. Everything else is only ever enriched:
/// ports accumulate, and a known MAC, hostname or OS guess is never replaced
/// by an absent one.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    ip: IpAddr,
    mac: Option<MacAddr>,
    vendor: Option<String>,
    hostname: Option<String>,
    status: Reachability,
    open_ports: BTreeSet<u16>,
    banners: BTreeMap<u16, String>,
    ttl: Option<u8>,
    os: Option<OsGuess>,
    role: Option<NetworkRole>,
    phase: HostPhase,
    last_updated: DateTime<Utc>,
}

impl Device {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            mac: None,
            vendor: None,
            hostname: None,
            status: Reachability::Unknown,
            open_ports: BTreeSet::new(),
            banners: BTreeMap::new(),
            ttl: None,
            os: None,
            role: None,
            phase: HostPhase::Discovered,
            last_updated: Utc::now(),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.mac
    }

    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn status(&self) -> Reachability {
        self.status
    }

    pub fn open_ports(&self) -> &BTreeSet<u16> {
        &self.open_ports
    }

    pub fn banners(&self) -> &BTreeMap<u16, String> {
        &self.banners
    }

    pub fn ttl(&self) -> Option<u8> {
        self.ttl
    }

    pub fn os(&self) -> Option<&OsGuess> {
        self.os.as_ref()
    }

    pub fn role(&self) -> Option<NetworkRole> {
        self.role
    }

    pub fn is_gateway(&self) -> bool {
        self.role == Some(NetworkRole::Gateway)
    }

    pub fn is_local_host(&self) -> bool {
        self.role == Some(NetworkRole::LocalHost)
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// `(port, service)` pairs for every open port, in port order.
    pub fn services(&self) -> Vec<(u16, &'static str)> {
        self.open_ports.iter().map(|&p| (p, service_name(p))).collect()
    }

    pub fn merge_mac(&mut self, mac: Option<MacAddr>) -> bool {
        match mac {
            Some(mac) if self.mac != Some(mac) && mac != MacAddr::zero() => {
                self.mac = Some(mac);
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn merge_vendor(&mut self, vendor: Option<String>) -> bool {
        match vendor.filter(|v| !v.trim().is_empty()) {
            Some(v) if self.vendor.as_deref() != Some(v.as_str()) => {
                self.vendor = Some(v);
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn merge_hostname(&mut self, hostname: Option<String>) -> bool {
        match hostname.filter(|h| !h.trim().is_empty()) {
            Some(h) if self.hostname.as_deref() != Some(h.as_str()) => {
                self.hostname = Some(h);
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn mark_alive(&mut self) -> bool {
        if self.status == Reachability::Alive {
            return false;
        }
        self.status = Reachability::Alive;
        self.touch();
        true
    }

    /// Only an undecided host can become unreachable; an observed response wins.
    pub fn mark_unreachable(&mut self) -> bool {
        if self.status != Reachability::Unknown {
            return false;
        }
        self.status = Reachability::Unreachable;
        self.touch();
        true
    }

    pub fn add_ports(&mut self, ports: impl IntoIterator<Item = u16>) -> bool {
        let before = self.open_ports.len();
        self.open_ports.extend(ports);
        let grew = self.open_ports.len() != before;
        if grew {
            self.touch();
        }
        grew
    }

    pub fn add_banners(&mut self, banners: impl IntoIterator<Item = (u16, String)>) -> bool {
        let mut changed = false;
        for (port, text) in banners {
            if text.trim().is_empty() || self.banners.get(&port) == Some(&text) {
                continue;
            }
            self.banners.insert(port, text);
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    pub fn set_ttl(&mut self, ttl: Option<u8>) -> bool {
        match ttl {
            Some(t) if self.ttl != Some(t) => {
                self.ttl = Some(t);
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// An `unknown` guess never replaces a known one.
    pub fn set_os(&mut self, guess: OsGuess) -> bool {
        let keep_existing = match &self.os {
            Some(current) => *current == guess || (guess.is_unknown() && !current.is_unknown()),
            None => false,
        };
        if keep_existing {
            return false;
        }
        self.os = Some(guess);
        self.touch();
        true
    }

    pub fn set_role(&mut self, role: NetworkRole) -> bool {
        if self.role == Some(role) {
            return false;
        }
        self.role = Some(role);
        self.touch();
        true
    }

    /// Phases only move forward.
    pub fn advance_phase(&mut self, phase: HostPhase) -> bool {
        if phase <= self.phase {
            return false;
        }
        self.phase = phase;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
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
