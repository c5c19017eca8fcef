// 5.0: per-symbol funding/market context. the market-data feed overwrites it in
// place; positions only ever read it through an owned snapshot so mark price and
// funding rate can never tear mid-recompute.
// 5.1 has the latest-wins timestamp discipline for out-of-order feeds.

use crate::types::{Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mutable per-symbol market state. One per symbol, owned by the engine,
/// written by market-data events, read by position recomputation. No history
/// is kept here; storage is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingContext {
    pub mark_price: Price,
    pub funding_rate: Decimal,
    pub mark_updated_at: Timestamp,
    pub funding_updated_at: Timestamp,
}

impl FundingContext {
    pub fn new() -> Self {
        Self {
            mark_price: Price::zero(),
            funding_rate: Decimal::ZERO,
            mark_updated_at: Timestamp::from_millis(0),
            funding_updated_at: Timestamp::from_millis(0),
        }
    }

    // 5.1: latest value per symbol wins. an event at or before the last applied
    // timestamp is a duplicate or a reorder and is discarded, not applied.
    pub fn apply_mark_price(&mut self, price: Price, timestamp: Timestamp) -> bool {
        if timestamp <= self.mark_updated_at && self.mark_updated_at.as_millis() != 0 {
            debug!(ts = timestamp.as_millis(), "discarding stale mark price");
            return false;
        }
        self.mark_price = price;
        self.mark_updated_at = timestamp;
        true
    }

    pub fn apply_funding_rate(&mut self, rate: Decimal, timestamp: Timestamp) -> bool {
        if timestamp <= self.funding_updated_at && self.funding_updated_at.as_millis() != 0 {
            debug!(ts = timestamp.as_millis(), "discarding stale funding rate");
            return false;
        }
        self.funding_rate = rate;
        self.funding_updated_at = timestamp;
        true
    }

    /// Owned, mutually consistent copy for one recompute call.
    pub fn snapshot(&self) -> FundingSnapshot {
        FundingSnapshot {
            mark_price: self.mark_price,
            funding_rate: self.funding_rate,
        }
    }
}

impl Default for FundingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single recompute call sees: one mark price and one funding rate,
/// taken at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub mark_price: Price,
    pub funding_rate: Decimal,
}

impl FundingSnapshot {
    pub fn flat() -> Self {
        Self {
            mark_price: Price::zero(),
            funding_rate: Decimal::ZERO,
        }
    }

    pub fn with_rate(rate: Decimal) -> Self {
        Self {
            mark_price: Price::zero(),
            funding_rate: rate,
        }
    }
}
