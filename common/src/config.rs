use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScanError;
use crate::network::range::PortRange;

pub const DEFAULT_PORT_CONCURRENCY: usize = 100;
pub const DEFAULT_HOST_CONCURRENCY: usize = 8;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BANNER_PORTS: usize = 5;

/// How live hosts are found on the subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanMethod {
    /// Link-layer address resolution sweep. Needs raw socket privileges.
    Arp,
    /// ICMP echo sweep.
    #[default]
    Icmp,
}

impl FromStr for ScanMethod {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arp" => Ok(Self::Arp),
            "icmp" | "ping" => Ok(Self::Icmp),
            other => Err(ScanError::InvalidConfig(format!("unknown scan method '{other}'"))),
        }
    }
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arp => f.write_str("arp"),
            Self::Icmp => f.write_str("icmp"),
        }
    }
}

/// Everything a scan session needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub port_range: PortRange,
    pub method: ScanMethod,
    /// Connect attempts in flight per host. Also bounds concurrent discovery probes.
    pub port_concurrency: usize,
    /// Hosts being port scanned at the same time.
    pub host_concurrency: usize,
    /// Per-probe timeout for discovery pings and port connects.
    pub timeout: Duration,
    pub grab_banners: bool,
    pub banner_timeout: Duration,
    pub max_banner_ports: usize,
    pub resolve_hostnames: bool,
    pub lookup_vendors: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            method: ScanMethod::default(),
            port_concurrency: DEFAULT_PORT_CONCURRENCY,
            host_concurrency: DEFAULT_HOST_CONCURRENCY,
            timeout: DEFAULT_PROBE_TIMEOUT,
            grab_banners: true,
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            max_banner_ports: DEFAULT_MAX_BANNER_PORTS,
            resolve_hostnames: true,
            lookup_vendors: true,
        }
    }
}

impl ScanConfig {
    /// Rejects settings that could never yield a scan.
    ///
    /// The port range is validated when it is built, so only the knobs that
    /// are plain integers or durations are checked here.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.port_concurrency == 0 {
            return Err(ScanError::InvalidConfig("port concurrency must be at least 1".into()));
        }
        if self.host_concurrency == 0 {
            return Err(ScanError::InvalidConfig("host concurrency must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::InvalidConfig("probe timeout must be greater than zero".into()));
        }
        if self.grab_banners && self.banner_timeout.is_zero() {
            return Err(ScanError::InvalidConfig("banner timeout must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn with_port_range(mut self, port_range: PortRange) -> Self {
        self.port_range = port_range;
        self
    }

    pub fn with_method(mut self, method: ScanMethod) -> Self {
        self.method = method;
        self
    }

    /// Turns off every lookup that leaves the probe path (DNS, OUI, banners).
    pub fn probes_only(mut self) -> Self {
        self.grab_banners = false;
        self.resolve_hostnames = false;
        self.lookup_vendors = false;
        self
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
