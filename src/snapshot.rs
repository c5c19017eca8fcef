// 6.0: the record published downstream after every recompute cycle. this is the
// serialization boundary: values arrive unrounded, exactly as the formulas
// produced them, and field names are part of the wire contract.

use crate::contract::MarginMode;
use crate::types::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: Decimal,
    pub margin_mode: MarginMode,
    pub value: Decimal,
    pub unrealised_pnl: Decimal,
    pub initial_margin: Decimal,
    pub liquidation_price: Decimal,
    pub fee_to_open: Decimal,
    pub fee_to_close: Decimal,
}

impl PositionSnapshot {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}
