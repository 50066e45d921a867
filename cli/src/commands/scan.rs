use std::time::Instant;

use anyhow::Context;
use colored::*;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::network::interface::route_source_ip;
use lanscope_common::network::device::Device;
use lanscope_common::{success, warn};
use lanscope_core::heatmap::HeatmapScale;
use lanscope_core::{Orchestrator, ScanEvent, ScanRequest, ScanState, ScanSummary, SessionHandle};

use crate::commands::ScanArgs;
use crate::lprint;
use crate::terminal::input::InputHandle;
use crate::terminal::spinner::ScanProgress;
use crate::terminal::{colors, format, print};

pub async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let mut request = ScanRequest::new(args.to_config());
    if let Some(ctx) = context_override(&args)? {
        request = request.with_context(ctx);
    }

    let orchestrator = Orchestrator::new();
    let start_time = Instant::now();
    let handle = orchestrator.start_scan(request).await?;

    if let Some(ctx) = handle.context() {
        print::aligned_line("Network", ctx.to_string().color(colors::IPV4_ADDR));
    }
    print::aligned_line("Session", handle.id().to_string());

    let summary = follow(&handle).await?;
    let devices = orchestrator.snapshot(&handle);

    scan_ends(&devices, &summary, start_time);
    Ok(())
}

/// Shows progress until the session ends and returns its summary.
async fn follow(handle: &SessionHandle) -> anyhow::Result<ScanSummary> {
    let mut events = handle.events().context("scan events already taken")?;
    let mut progress = ScanProgress::start();

    let mut input = InputHandle::start({
        let handle = handle.clone();
        move || handle.cancel()
    });
    let ctrl_c = tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        }
    });

    let mut summary = None;
    while let Some(event) = events.recv().await {
        progress.set_state(handle.state());
        match event {
            ScanEvent::DeviceDiscovered(device) | ScanEvent::DeviceUpdated(device) => {
                progress.observe(&device);
            }
            ScanEvent::ScanCompleted(s) => {
                summary = Some(s);
                break;
            }
            ScanEvent::ScanCancelled(s) => {
                warn!("Scan interrupted, showing partial results");
                summary = Some(s);
                break;
            }
        }
    }

    input.stop();
    ctrl_c.abort();
    drop(progress);

    handle.wait().await;
    Ok(summary.unwrap_or_else(|| handle.summary()))
}

fn context_override(args: &ScanArgs) -> anyhow::Result<Option<NetworkContext>> {
    let Some(subnet) = args.subnet else {
        return Ok(None);
    };
    let local = args
        .local
        .or_else(|| route_source_ip(subnet.network()))
        .context("cannot tell the local address inside --subnet, pass --local")?;

    let ctx = NetworkContext::new(local, subnet)?.with_gateway(args.gateway);
    Ok(Some(ctx))
}

fn scan_ends(devices: &[Device], summary: &ScanSummary, start_time: Instant) {
    if devices.is_empty() {
        print::header("zero hosts detected");
        print::no_results();
        return;
    }

    lprint!();
    print::header("network scan");
    let scale = HeatmapScale::default();
    for (idx, device) in devices.iter().enumerate() {
        print::tree_head(idx, &format::device_title(device));
        print::as_tree_one_level(format::device_details(device, &scale));
        if idx + 1 != devices.len() {
            lprint!();
        }
    }

    print_summary(summary, start_time);
}

fn print_summary(summary: &ScanSummary, start_time: Instant) {
    let alive = format!("{} alive hosts", summary.alive_devices).bold().green();
    let ports = format!("{} open ports", summary.total_open_ports).bold().cyan();
    let total_time = format!("{:.2}s", start_time.elapsed().as_secs_f64()).bold().yellow();
    let verb = match summary.state {
        ScanState::Cancelled => "Scan Cancelled",
        _ => "Scan Complete",
    };
    let output = format!("{verb}: {alive}, {ports} in {total_time}");

    print::fat_separator();
    print::centerln(&output);
    if let Some(strategy) = summary.strategy {
        success!("Hosts discovered via {strategy}");
    }
}
