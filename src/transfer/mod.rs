//! Transfer orchestrator
//!
//! Each node keeps its own copy of every transfer it takes part in. Copies on
//! the two nodes are reconciled only through the RPCs in `api::rpc`.

mod orchestrator;

pub use orchestrator::TransferOrchestrator;
