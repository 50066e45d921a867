use std::collections::HashSet;
use std::net::IpAddr;

use colored::*;
use indicatif::ProgressStyle;
use lanscope_common::network::device::{Device, HostPhase};
use lanscope_core::ScanState;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TIP: &str = "press 'q' to finish early";
const TICKS: &[&str] = &[
    "▁▁▁▁▁", "▁▂▂▂▁", "▁▄▂▄▁", "▂▄▆▄▂", "▄▆█▆▄", "▂▄▆▄▂", "▁▄▂▄▁", "▁▂▂▂▁",
];

/// Spinner line fed by scan events.
pub struct ScanProgress {
    span: Span,
    found: HashSet<IpAddr>,
    scanned: HashSet<IpAddr>,
    state: ScanState,
}

impl ScanProgress {
    pub fn start() -> Self {
        let span = info_span!("scan", indicatif.pb_show = true);
        if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            span.pb_set_style(&style.tick_strings(TICKS));
        }
        span.in_scope(|| {});

        let progress = Self {
            span,
            found: HashSet::new(),
            scanned: HashSet::new(),
            state: ScanState::Discovering,
        };
        progress.refresh();
        progress
    }

    pub fn observe(&mut self, device: &Device) {
        self.found.insert(device.ip());
        if device.phase() >= HostPhase::Scanned {
            self.scanned.insert(device.ip());
        }
        self.refresh();
    }

    pub fn set_state(&mut self, state: ScanState) {
        if state != self.state {
            self.state = state;
            self.refresh();
        }
    }

    fn refresh(&self) {
        let msg = format!(
            "{}: {} hosts found, {} scanned {}",
            self.state,
            self.found.len().to_string().green().bold(),
            self.scanned.len().to_string().green().bold(),
            format!("({TIP})").italic().bright_black()
        );
        self.span.pb_set_message(&msg);
    }
}
