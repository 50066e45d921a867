use std::io;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long a blocking read may wait before the capture thread rechecks
/// its stop token.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct EthernetHandle {
    pub tx: Box<dyn DataLinkSender>,
    pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Opens a raw Ethernet channel on `intf` and pumps received frames into a
/// tokio channel from a dedicated OS thread.
///
/// The thread exits once `stop` fires or the returned receiver is dropped.
pub fn start_capture(intf: &NetworkInterface, stop: CancellationToken) -> anyhow::Result<EthernetHandle> {
    start_capture_with(intf, stop, datalink::channel)
}

pub fn start_capture_with<F>(
    intf: &NetworkInterface,
    stop: CancellationToken,
    channel_opener: F,
) -> anyhow::Result<EthernetHandle>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let (tx, rx) = open_eth_channel(intf, &capture_config(), channel_opener)?;
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name(format!("capture-{}", intf.name))
        .spawn(move || pump_frames(rx, queue_tx, stop))
        .context("spawning capture thread")?;

    Ok(EthernetHandle { tx, rx: queue_rx })
}

fn pump_frames(
    mut rx: Box<dyn DataLinkReceiver>,
    queue: mpsc::UnboundedSender<Vec<u8>>,
    stop: CancellationToken,
) {
    while !stop.is_cancelled() {
        match rx.next() {
            Ok(frame) => {
                if queue.send(frame.to_vec()).is_err() {
                    break;
                }
            }
            Err(_) => {
                if queue.is_closed() {
                    break;
                }
            }
        }
    }
}

fn capture_config() -> Config {
    Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Config::default()
    }
}

fn open_eth_channel<F>(
    intf: &NetworkInterface,
    cfg: &Config,
    channel_opener: F,
) -> anyhow::Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let ch: Channel = channel_opener(intf, *cfg).with_context(|| format!("opening on {}", intf.name))?;
    match ch {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => bail!("non-ethernet channel for {}", intf.name),
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
