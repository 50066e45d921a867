//! Shared data model for the lanscope workspace.
//!
//! Everything that crosses a crate boundary lives here: the network context,
//! the [`Device`](network::device::Device) record, scan configuration and the
//! error taxonomy surfaced to callers.

pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod vendors;

#[doc(hidden)]
pub use tracing as __tracing;
