use colored::*;
use lanscope_common::network::device::{Device, NetworkRole, Reachability};
use lanscope_core::heatmap::HeatmapScale;

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

const HEAT_CELLS: usize = 10;

pub fn device_title(device: &Device) -> String {
    match device.hostname() {
        Some(name) => format!("{} ({})", device.ip(), name),
        None => device.ip().to_string(),
    }
}

pub fn device_details(device: &Device, scale: &HeatmapScale) -> Vec<Detail> {
    let mut details: Vec<Detail> = Vec::new();

    details.push(("Status".to_string(), status(device.status())));

    if let Some(mac) = device.mac() {
        details.push(("MAC".to_string(), mac.to_string().color(colors::MAC_ADDR)));
    }
    if let Some(vendor) = device.vendor() {
        details.push(("Vendor".to_string(), vendor.normal()));
    }
    if let Some(roles) = roles(device) {
        details.push(("Roles".to_string(), roles.color(colors::ACCENT)));
    }
    if !device.open_ports().is_empty() {
        details.push(("Ports".to_string(), ports(device).normal()));
    }
    if let Some(os) = device.os().filter(|os| !os.is_unknown()) {
        let text = format!("{} ({:.0}%)", os.label(), os.confidence * 100.0);
        details.push(("OS".to_string(), text.normal()));
    }
    details.push(("Heat".to_string(), heat_bar(scale.intensity(device))));

    details
}

fn status(reachability: Reachability) -> ColoredString {
    let color = match reachability {
        Reachability::Alive => colors::ALIVE,
        Reachability::Unreachable => colors::UNREACHABLE,
        Reachability::Unknown => colors::UNKNOWN,
    };
    reachability.to_string().color(color)
}

fn roles(device: &Device) -> Option<String> {
    match device.role()? {
        NetworkRole::Gateway => Some("gateway".to_string()),
        NetworkRole::LocalHost => Some("this host".to_string()),
    }
}

fn ports(device: &Device) -> String {
    device
        .services()
        .iter()
        .map(|(port, name)| format!("{port}/{name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn heat_bar(intensity: f64) -> ColoredString {
    let filled = (intensity.clamp(0.0, 1.0) * HEAT_CELLS as f64).round() as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(HEAT_CELLS - filled));
    match filled {
        0..=3 => bar.green(),
        4..=6 => bar.yellow(),
        _ => bar.red(),
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
