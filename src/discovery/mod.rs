//! Discovery engine
//!
//! Active subnet sweeps plus on-demand probes feed the peer registry. The
//! passive responder lives in `api::discover`.

mod client;
mod sweep;

pub use client::PeerClient;
pub use sweep::{local_ipv4_addrs, sweep_candidates, Discovery, SweepReport};
