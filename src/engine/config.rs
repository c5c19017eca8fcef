//! Engine configuration options.

use crate::contract::MarginMode;
use crate::types::Leverage;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Leverage assigned to positions auto-created by a first fill.
    pub default_leverage: Leverage,
    /// Margin mode for positions auto-created by a first fill.
    pub default_margin_mode: MarginMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            default_leverage: Leverage::one(),
            default_margin_mode: MarginMode::Isolated,
        }
    }
}
