// 7.0: events in and out of the engine. inbound events arrive from the external
// channel transport already well-formed; outbound events form a bounded audit
// log and carry the snapshots downstream consumers subscribe to.

use crate::snapshot::PositionSnapshot;
use crate::types::{AccountId, Price, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// inbound

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPriceEvent {
    pub symbol: Symbol,
    pub mark_price: Price,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRateEvent {
    pub symbol: Symbol,
    pub funding_rate: Decimal,
    pub timestamp: Timestamp,
}

/// One fill against an account's position. `quantity_delta` is signed:
/// positive buys, negative sells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub account: AccountId,
    pub symbol: Symbol,
    pub quantity_delta: Decimal,
    pub fill_price: Price,
    pub timestamp: Timestamp,
}

// outbound

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    PositionOpened(PositionOpenedEvent),
    PositionUpdated(PositionSnapshot),
    PositionClosed(PositionClosedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    StaleEventDiscarded(StaleEventDiscardedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub account: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub account: AccountId,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub account: AccountId,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub liquidation_price: Decimal,
    pub mark_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleEventDiscardedEvent {
    pub symbol: Symbol,
    pub timestamp: Timestamp,
}
