use thiserror::Error;

/// Failures that reach the caller of the scan engine.
///
/// Per-probe timeouts and cancellation never appear here: a timeout is a
/// negative probe result and cancellation is a session state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No usable interface, address or subnet could be determined. Aborts the session.
    #[error("failed to resolve the local network: {0}")]
    Resolution(String),
    /// The scan target could not be turned into a probe-able address.
    #[error("target {0} cannot be reached")]
    TargetUnreachable(String),
    /// The requested configuration can never produce a scan.
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
}

pub type ScanResult<T> = Result<T, ScanError>;
