pub mod info;
pub mod scan;

use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lanscope_common::config::{ScanConfig, ScanMethod};
use lanscope_common::network::range::PortRange;
use pnet::ipnetwork::Ipv4Network;

#[derive(Parser)]
#[command(name = "lanscope")]
#[command(about = "Discover, port scan and fingerprint the hosts on your LAN.")]
pub struct CommandLine {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the network this machine would scan
    #[command(alias = "i")]
    Info,
    /// Scan the local network
    #[command(alias = "s")]
    Scan(ScanArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Arp,
    Icmp,
}

impl From<MethodArg> for ScanMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Arp => ScanMethod::Arp,
            MethodArg::Icmp => ScanMethod::Icmp,
        }
    }
}

#[derive(Args)]
pub struct ScanArgs {
    /// Ports to probe on every host, e.g. `22` or `1-1024`
    #[arg(short, long, default_value_t = PortRange::default())]
    pub ports: PortRange,

    /// Host discovery technique
    #[arg(short, long, value_enum, default_value_t = MethodArg::Icmp)]
    pub method: MethodArg,

    /// Port probes in flight per host
    #[arg(short, long, default_value_t = lanscope_common::config::DEFAULT_PORT_CONCURRENCY)]
    pub concurrency: usize,

    /// Hosts scanned at the same time
    #[arg(long, default_value_t = lanscope_common::config::DEFAULT_HOST_CONCURRENCY)]
    pub hosts: usize,

    /// Per-probe timeout in milliseconds
    #[arg(short, long = "timeout-ms", default_value_t = 500)]
    pub timeout_ms: u64,

    /// Scan this subnet instead of the detected one
    #[arg(long)]
    pub subnet: Option<Ipv4Network>,

    /// Gateway of `--subnet`
    #[arg(long, requires = "subnet")]
    pub gateway: Option<Ipv4Addr>,

    /// Local address inside `--subnet`, detected from the routing table if absent
    #[arg(long, requires = "subnet")]
    pub local: Option<Ipv4Addr>,

    /// Skip reverse DNS lookups
    #[arg(long)]
    pub no_dns: bool,

    /// Skip banner grabbing
    #[arg(long)]
    pub no_banners: bool,

    /// Skip MAC vendor lookups
    #[arg(long)]
    pub no_vendors: bool,
}

impl ScanArgs {
    pub fn to_config(&self) -> ScanConfig {
        ScanConfig {
            port_range: self.ports,
            method: self.method.into(),
            port_concurrency: self.concurrency,
            host_concurrency: self.hosts,
            timeout: Duration::from_millis(self.timeout_ms),
            grab_banners: !self.no_banners,
            resolve_hostnames: !self.no_dns,
            lookup_vendors: !self.no_vendors,
            ..ScanConfig::default()
        }
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
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
