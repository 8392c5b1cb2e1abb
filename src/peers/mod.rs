//! Peer registry
//!
//! Owns every known peer record. Other components only ever see copies.

mod reaper;
mod registry;

pub use reaper::run_reaper;
pub use registry::{PeerRegistry, ReapReport, UpsertOutcome};
