// 8.0: the risk engine. owns the position book, contract descriptors, and
// per-symbol funding contexts; applies market-data and fill events in arrival
// order and republishes snapshots after each recompute cycle.
// deterministic pure-CPU decimal math with no I/O inside.

mod config;
mod core;
mod fills;
mod pricing;

pub use config::EngineConfig;
pub use core::{PositionKey, RiskEngine};
