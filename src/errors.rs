// 2.0: every way a risk computation or update can be refused. all errors are
// synchronous and final: nothing in this crate retries, and nothing is
// silently corrected.

use crate::types::{AccountId, Leverage, Symbol};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("leverage {requested} outside [1, {max}] for {symbol}")]
    LeverageOutOfBounds {
        symbol: Symbol,
        requested: Leverage,
        max: Leverage,
    },

    #[error("isolated liquidation price is undefined for a cross-margin position")]
    CrossLiquidationUnsupported,

    #[error("no contract descriptor registered for {0}")]
    UnknownSymbol(Symbol),

    #[error("no position for account {account:?} on {symbol}")]
    NoPosition { account: AccountId, symbol: Symbol },

    #[error("fill quantity delta must be non-zero")]
    EmptyFill,
}
