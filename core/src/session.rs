//! Per-scan state: the device table, the state machine and the event feed.
//!
//! A [`ScanSession`] is owned by the orchestrator's pipeline. Callers only
//! ever hold a [`SessionHandle`], which hands out copies of the devices and
//! never a reference into the live table.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use lanscope_common::config::ScanConfig;
use lanscope_common::network::context::NetworkContext;
use lanscope_common::network::device::{Device, Reachability};
use pnet::ipnetwork::Ipv4Network;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScanState {
    Idle,
    Resolving,
    Discovering,
    Scanning,
    Fingerprinting,
    Completed,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// States only move forward, and nothing leaves a terminal state.
    fn can_advance_to(&self, next: ScanState) -> bool {
        !self.is_terminal() && (next == Self::Cancelled || next > *self)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Discovering => "discovering",
            Self::Scanning => "scanning",
            Self::Fingerprinting => "fingerprinting",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    DeviceDiscovered(Device),
    DeviceUpdated(Device),
    ScanCompleted(ScanSummary),
    ScanCancelled(ScanSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub session_id: Uuid,
    pub network: Option<Ipv4Network>,
    pub local_address: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub strategy: Option<&'static str>,
    pub total_devices: usize,
    pub alive_devices: usize,
    pub total_open_ports: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: ScanState,
}

#[derive(Default)]
struct DeviceTable {
    devices: HashMap<IpAddr, Device>,
    /// Addresses in the order they were first seen.
    order: Vec<IpAddr>,
}

pub(crate) struct ScanSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: OnceLock<DateTime<Utc>>,
    config: ScanConfig,
    context: OnceLock<NetworkContext>,
    strategy: OnceLock<&'static str>,
    cancel: CancellationToken,
    state: watch::Sender<ScanState>,
    devices: RwLock<DeviceTable>,
    host_locks: Mutex<HashMap<IpAddr, Arc<tokio::sync::Mutex<()>>>>,
    events: mpsc::UnboundedSender<ScanEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<ScanEvent>>>,
}

impl ScanSession {
    pub(crate) fn new(config: ScanConfig) -> Arc<Self> {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ScanState::Idle);

        Arc::new(Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: OnceLock::new(),
            config,
            context: OnceLock::new(),
            strategy: OnceLock::new(),
            cancel: CancellationToken::new(),
            state,
            devices: RwLock::new(DeviceTable::default()),
            host_locks: Mutex::new(HashMap::new()),
            events,
            event_rx: Mutex::new(Some(event_rx)),
        })
    }

    pub(crate) fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn set_context(&self, ctx: NetworkContext) {
        let _ = self.context.set(ctx);
    }

    pub(crate) fn context(&self) -> Option<&NetworkContext> {
        self.context.get()
    }

    pub(crate) fn set_strategy(&self, name: &'static str) {
        let _ = self.strategy.set(name);
    }

    pub(crate) fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Moves the state machine forward. Returns `false` if `next` would be a
    /// step backwards or the session already ended. Once cancel was requested
    /// the only step left is `Cancelled`.
    pub(crate) fn transition(&self, next: ScanState) -> bool {
        if self.cancel.is_cancelled() && next != ScanState::Cancelled {
            return false;
        }
        self.state.send_if_modified(|current| {
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Ends the session and publishes its summary.
    pub(crate) fn finish(&self, state: ScanState) {
        let _ = self.finished_at.set(Utc::now());
        if !self.transition(state) {
            return;
        }
        let summary = self.summary();
        let event = match state {
            ScanState::Cancelled => ScanEvent::ScanCancelled(summary),
            _ => ScanEvent::ScanCompleted(summary),
        };
        let _ = self.events.send(event);
    }

    /// Applies `update` to the device at `ip`, creating it first if needed.
    ///
    /// The closure runs under the table's write lock and reports whether it
    /// changed anything. A discovered or updated event is published before the
    /// lock is released, so events for one device arrive in mutation order.
    pub(crate) fn update_device(&self, ip: IpAddr, update: impl FnOnce(&mut Device) -> bool) -> Device {
        let mut table = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let DeviceTable { devices, order } = &mut *table;

        let created = !devices.contains_key(&ip);
        let device = devices.entry(ip).or_insert_with(|| {
            order.push(ip);
            Device::new(ip)
        });
        let changed = update(device);
        let copy = device.clone();

        if created {
            let _ = self.events.send(ScanEvent::DeviceDiscovered(copy.clone()));
        } else if changed {
            let _ = self.events.send(ScanEvent::DeviceUpdated(copy.clone()));
        }
        copy
    }

    pub(crate) fn device(&self, ip: IpAddr) -> Option<Device> {
        let table = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        table.devices.get(&ip).cloned()
    }

    /// Gateway first, local host second, everything else in discovery order.
    pub(crate) fn snapshot(&self) -> Vec<Device> {
        let table = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut devices: Vec<Device> = table
            .order
            .iter()
            .filter_map(|ip| table.devices.get(ip).cloned())
            .collect();
        drop(table);

        devices.sort_by_key(|d| match (d.is_gateway(), d.is_local_host()) {
            (true, _) => 0,
            (_, true) => 1,
            _ => 2,
        });
        devices
    }

    /// The lock that serialises port scans of one host.
    pub(crate) fn host_lock(&self, ip: IpAddr) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.host_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(ip).or_default().clone()
    }

    pub(crate) fn summary(&self) -> ScanSummary {
        let table = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let ctx = self.context.get();

        ScanSummary {
            session_id: self.id,
            network: ctx.map(|c| c.subnet()),
            local_address: ctx.map(|c| c.local_addr()),
            gateway: ctx.and_then(|c| c.gateway()),
            strategy: self.strategy.get().copied(),
            total_devices: table.devices.len(),
            alive_devices: table
                .devices
                .values()
                .filter(|d| d.status() == Reachability::Alive)
                .count(),
            total_open_ports: table.devices.values().map(|d| d.open_ports().len()).sum(),
            started_at: self.started_at,
            finished_at: self.finished_at.get().copied(),
            state: self.state(),
        }
    }
}

/// The caller's view of a running or finished scan.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<ScanSession>,
}

impl SessionHandle {
    pub(crate) fn new(session: Arc<ScanSession>) -> Self {
        Self { session }
    }

    pub(crate) fn session(&self) -> &Arc<ScanSession> {
        &self.session
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.session.started_at
    }

    pub fn state(&self) -> ScanState {
        self.session.state()
    }

    pub fn config(&self) -> &ScanConfig {
        self.session.config()
    }

    pub fn context(&self) -> Option<&NetworkContext> {
        self.session.context()
    }

    /// Discovery strategy that actually ran after fallbacks.
    pub fn effective_strategy(&self) -> Option<&'static str> {
        self.session.strategy.get().copied()
    }

    /// The event feed. Only the first caller gets it.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ScanEvent>> {
        self.session
            .event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.session.state.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.session.snapshot()
    }

    pub fn device(&self, ip: IpAddr) -> Option<Device> {
        self.session.device(ip)
    }

    pub fn summary(&self) -> ScanSummary {
        self.session.summary()
    }

    /// Requests a cooperative stop. The session reaches `Cancelled` once the
    /// probes already in flight have finished.
    pub fn cancel(&self) {
        self.session.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.session.cancel.is_cancelled()
    }

    /// Resolves once the session reached `Completed` or `Cancelled`.
    pub async fn wait(&self) -> ScanState {
        let mut rx = self.session.state.subscribe();
        match rx.wait_for(ScanState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
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
