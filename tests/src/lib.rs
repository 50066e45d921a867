//! End-to-end checks of the scan orchestrator against scripted networks.

#![cfg(test)]

mod cancellation;
mod scenarios;
mod support;
