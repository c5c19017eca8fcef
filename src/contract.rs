//! Contract descriptors: per-symbol static data.
//!
//! A descriptor is loaded once from exchange metadata and shared read-only
//! (`Arc`) across every position on that symbol. Metadata refresh replaces
//! the descriptor wholesale; nothing mutates one in place.

use crate::types::{Leverage, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Settlement model. Linear settles in quote currency, inverse settles in
/// base currency with reciprocal-price PnL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractType {
    Linear,
    Inverse,
}

/// Margin allocation model. Isolated margin backs exactly one position;
/// cross margin is shared account-wide, so per-position liquidation math
/// does not apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// One rung of a maintenance-margin ladder: positions up to `max_notional`
/// pay `maintenance_margin_rate`. Ladders are ordered ascending by notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginTier {
    pub max_notional: Decimal,
    pub maintenance_margin_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDescriptor {
    pub symbol: Symbol,
    pub settlement_asset: String,
    pub contract_type: ContractType,
    /// Decimal multiplier per contract unit.
    pub contract_size: Decimal,
    /// Flat base rate, used when `margin_tiers` is empty or the notional
    /// exceeds the last tier.
    pub maintenance_margin_rate: Decimal,
    pub margin_tiers: Vec<MarginTier>,
    pub taker_fee_rate: Decimal,
    pub maker_fee_rate: Decimal,
    pub max_leverage: Leverage,
}

impl ContractDescriptor {
    /// Maintenance margin rate for a given absolute notional, walking the
    /// tier ladder. Falls back to the flat rate past the last tier.
    pub fn maintenance_margin_rate_for(&self, notional: Decimal) -> Decimal {
        for tier in &self.margin_tiers {
            if notional <= tier.max_notional {
                return tier.maintenance_margin_rate;
            }
        }
        self.maintenance_margin_rate
    }

    pub fn fee_rate(&self, maker: bool) -> Decimal {
        if maker {
            self.maker_fee_rate
        } else {
            self.taker_fee_rate
        }
    }

    pub fn is_inverse(&self) -> bool {
        self.contract_type == ContractType::Inverse
    }

    /// BTC/USD inverse perpetual with exchange-typical defaults.
    pub fn btc_usd_inverse() -> Self {
        Self {
            symbol: Symbol::from("BTC/USD:BTC"),
            settlement_asset: "BTC".to_string(),
            contract_type: ContractType::Inverse,
            contract_size: Decimal::ONE,
            maintenance_margin_rate: dec!(0.01),
            margin_tiers: Vec::new(),
            taker_fee_rate: dec!(0.001),
            maker_fee_rate: dec!(0.0005),
            max_leverage: Leverage::new(dec!(100)).unwrap(),
        }
    }

    /// BTC/USDT linear perpetual with exchange-typical defaults.
    pub fn btc_usdt_linear() -> Self {
        Self {
            symbol: Symbol::from("BTC/USDT:USDT"),
            settlement_asset: "USDT".to_string(),
            contract_type: ContractType::Linear,
            contract_size: Decimal::ONE,
            maintenance_margin_rate: dec!(0.005),
            margin_tiers: Vec::new(),
            taker_fee_rate: dec!(0.0006),
            maker_fee_rate: dec!(0.0001),
            max_leverage: Leverage::new(dec!(125)).unwrap(),
        }
    }
}
