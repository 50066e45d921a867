//! The scanning engine: context resolution, host discovery, port scanning,
//! OS fingerprinting and the session orchestrator that ties them together.

pub mod discovery;
pub mod enrich;
pub mod fingerprint;
pub mod heatmap;
pub mod network;
pub mod orchestrator;
pub mod resolver;
pub mod scanner;
pub mod session;
pub mod vendors;

pub use orchestrator::{Orchestrator, ScanRequest};
pub use session::{ScanEvent, ScanState, ScanSummary, SessionHandle};
