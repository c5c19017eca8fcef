//! Market-data application: mark price ticks and funding rate changes.
//!
//! Each accepted event updates the symbol's funding context, then sweeps the
//! symbol's positions through a full recompute cycle under their own locks.
//! Stale events (timestamp at or before the last applied one) are discarded
//! with an audit mark, never applied out of order.

use super::core::{lock, write, RiskEngine};
use crate::errors::RiskError;
use crate::events::{
    EventPayload, FundingRateEvent, MarkPriceEvent, PositionLiquidatedEvent,
    StaleEventDiscardedEvent,
};
use crate::position::PositionDelta;
use crate::snapshot::PositionSnapshot;
use crate::types::Timestamp;
use tracing::{debug, warn};

impl RiskEngine {
    /// Apply a mark price tick. Returns the refreshed snapshots, empty when
    /// the tick was stale or the symbol has no positions.
    pub fn apply_mark_price(
        &self,
        event: MarkPriceEvent,
    ) -> Result<Vec<PositionSnapshot>, RiskError> {
        let market = self.market(&event.symbol)?;

        let funding = {
            let mut context = write(&market);
            if !context.apply_mark_price(event.mark_price, event.timestamp) {
                drop(context);
                self.discard_stale(&event.symbol, event.timestamp);
                return Ok(Vec::new());
            }
            context.snapshot()
        };

        let mut snapshots = Vec::new();
        for (key, slot) in self.positions_for(&event.symbol) {
            let mut position = lock(&slot);
            position.update(PositionDelta::mark(event.mark_price))?;
            position.refresh(&funding)?;

            if position.is_liquidatable(event.mark_price) {
                warn!(
                    symbol = %key.symbol,
                    account = key.account.0,
                    liquidation_price = %position.liquidation_price,
                    mark = %event.mark_price,
                    "isolated position crossed its liquidation price"
                );
                self.emit(
                    event.timestamp,
                    EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                        account: key.account,
                        symbol: key.symbol.clone(),
                        quantity: position.quantity.value(),
                        liquidation_price: position.liquidation_price,
                        mark_price: event.mark_price.value(),
                    }),
                );
                // force-close: the exposure is taken over by the liquidation
                // flow, which is outside this engine
                let flatten = -position.quantity.value();
                position.update(PositionDelta::quantity(flatten))?;
                position.refresh(&funding)?;
            }

            let snapshot = position.snapshot();
            drop(position);
            self.emit(event.timestamp, EventPayload::PositionUpdated(snapshot.clone()));
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Apply a funding rate change. Maintenance and liquidation figures read
    /// live funding, so the symbol's positions are re-derived.
    pub fn apply_funding_rate(
        &self,
        event: FundingRateEvent,
    ) -> Result<Vec<PositionSnapshot>, RiskError> {
        let market = self.market(&event.symbol)?;

        let funding = {
            let mut context = write(&market);
            if !context.apply_funding_rate(event.funding_rate, event.timestamp) {
                drop(context);
                self.discard_stale(&event.symbol, event.timestamp);
                return Ok(Vec::new());
            }
            context.snapshot()
        };

        let mut snapshots = Vec::new();
        for (_key, slot) in self.positions_for(&event.symbol) {
            let mut position = lock(&slot);
            position.refresh(&funding)?;
            let snapshot = position.snapshot();
            drop(position);
            self.emit(event.timestamp, EventPayload::PositionUpdated(snapshot.clone()));
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn discard_stale(&self, symbol: &crate::types::Symbol, timestamp: Timestamp) {
        debug!(symbol = %symbol, ts = timestamp.as_millis(), "stale market-data event discarded");
        self.emit(
            timestamp,
            EventPayload::StaleEventDiscarded(StaleEventDiscardedEvent {
                symbol: symbol.clone(),
                timestamp,
            }),
        );
    }
}
