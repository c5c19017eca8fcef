//! Fill application: the account-event side of the update protocol.
//!
//! A fill mutates raw position fields (additive quantity, volume-weighted
//! entry price) and then runs one recompute cycle, all under the position's
//! lock. Fills for one position apply strictly in timestamp order; a fill
//! older than the last applied event is discarded, because entry price and
//! PnL are path-dependent.

use super::core::{lock, RiskEngine};
use crate::errors::RiskError;
use crate::events::{
    EventPayload, FillEvent, PositionClosedEvent, PositionOpenedEvent, StaleEventDiscardedEvent,
};
use crate::position::{Position, PositionDelta};
use crate::snapshot::PositionSnapshot;
use crate::types::{AccountId, Leverage, Price, Symbol};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::warn;

impl RiskEngine {
    /// Apply one fill. Returns the refreshed snapshot, or `None` when the
    /// fill arrived out of order and was discarded.
    pub fn apply_fill(&self, fill: FillEvent) -> Result<Option<PositionSnapshot>, RiskError> {
        if fill.quantity_delta.is_zero() {
            return Err(RiskError::EmptyFill);
        }

        let funding = self.funding_snapshot(&fill.symbol)?;
        let (key, slot) = self.position_for_fill(fill.account, &fill.symbol)?;

        let mut position = lock(&slot);

        if fill.timestamp < position.last_fill_at {
            warn!(
                symbol = %fill.symbol,
                account = fill.account.0,
                ts = fill.timestamp.as_millis(),
                "out-of-order fill discarded"
            );
            self.emit(
                fill.timestamp,
                EventPayload::StaleEventDiscarded(StaleEventDiscardedEvent {
                    symbol: fill.symbol.clone(),
                    timestamp: fill.timestamp,
                }),
            );
            return Ok(None);
        }

        let was_open = position.is_open();
        let entry_price = fill_entry_price(&position, fill.quantity_delta, fill.fill_price);

        position.update(PositionDelta {
            quantity_delta: Some(fill.quantity_delta),
            entry_price,
            mark_price: None,
        })?;
        position.last_fill_at = fill.timestamp;
        position.refresh(&funding)?;

        let snapshot = position.snapshot();
        let now_open = position.is_open();
        let side = position.side();
        drop(position);

        if !was_open && now_open {
            self.emit(
                fill.timestamp,
                EventPayload::PositionOpened(PositionOpenedEvent {
                    account: key.account,
                    symbol: key.symbol.clone(),
                    side: side.unwrap_or(crate::types::Side::Long),
                    quantity: snapshot.quantity,
                    entry_price: snapshot.entry_price,
                }),
            );
        }
        if was_open && !now_open {
            self.emit(
                fill.timestamp,
                EventPayload::PositionClosed(PositionClosedEvent {
                    account: key.account,
                    symbol: key.symbol.clone(),
                }),
            );
        }
        self.emit(fill.timestamp, EventPayload::PositionUpdated(snapshot.clone()));

        Ok(Some(snapshot))
    }

    /// Re-leverage a position. Bounds are checked against the descriptor and
    /// the leverage-dependent derived fields recomputed under the lock.
    pub fn set_leverage(
        &self,
        account: AccountId,
        symbol: &Symbol,
        leverage: Leverage,
    ) -> Result<PositionSnapshot, RiskError> {
        let funding = self.funding_snapshot(symbol)?;
        let (_, slot) = self
            .find_position(account, symbol)
            .ok_or_else(|| RiskError::NoPosition {
                account,
                symbol: symbol.clone(),
            })?;

        let mut position = lock(&slot);
        position.set_leverage(leverage, &funding)?;
        let snapshot = position.snapshot();
        drop(position);

        self.emit(
            crate::types::Timestamp::now(),
            EventPayload::PositionUpdated(snapshot.clone()),
        );
        Ok(snapshot)
    }

    // a first fill on an unseen (account, symbol) auto-creates the slot with
    // the configured defaults
    fn position_for_fill(
        &self,
        account: AccountId,
        symbol: &Symbol,
    ) -> Result<(super::core::PositionKey, Arc<Mutex<Position>>), RiskError> {
        if let Some(found) = self.find_position(account, symbol) {
            return Ok(found);
        }
        let key = self.open_position(
            account,
            symbol,
            self.config.default_margin_mode,
            self.config.default_leverage,
        )?;
        let slot = self.position(&key).ok_or_else(|| RiskError::NoPosition {
            account,
            symbol: symbol.clone(),
        })?;
        Ok((key, slot))
    }
}

/// Entry price handling for one fill:
/// - opening or adding on the same side volume-weights the entry,
/// - reducing leaves the entry untouched,
/// - flipping through zero rebases the entry at the fill price.
fn fill_entry_price(position: &Position, delta: Decimal, fill_price: Price) -> Option<Price> {
    let old_qty = position.quantity;
    let new_qty = old_qty.value() + delta;

    if new_qty.is_zero() {
        // fully closed; the position clears its own entry
        return None;
    }

    let same_side = old_qty.is_zero() || old_qty.is_long() == (delta > Decimal::ZERO);
    if same_side {
        let old_abs = old_qty.abs();
        let weighted =
            old_abs * position.entry_price.value() + delta.abs() * fill_price.value();
        return Some(Price::new_unchecked(weighted / new_qty.abs()));
    }

    let flipped = old_qty.is_long() != (new_qty > Decimal::ZERO);
    if flipped {
        Some(fill_price)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractDescriptor, MarginMode};
    use crate::engine::EngineConfig;
    use crate::events::MarkPriceEvent;
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

    fn engine_with_linear() -> (RiskEngine, Symbol) {
        let engine = RiskEngine::new(EngineConfig::default());
        let contract = ContractDescriptor::btc_usdt_linear();
        let symbol = contract.symbol.clone();
        engine.register_contract(contract);
        (engine, symbol)
    }

    fn fill(symbol: &Symbol, delta: Decimal, price: Decimal, ts: i64) -> FillEvent {
        FillEvent {
            account: AccountId(1),
            symbol: symbol.clone(),
            quantity_delta: delta,
            fill_price: Price::new_unchecked(price),
            timestamp: Timestamp::from_millis(ts),
        }
    }

    fn mark(symbol: &Symbol, price: Decimal, ts: i64) -> MarkPriceEvent {
        MarkPriceEvent {
            symbol: symbol.clone(),
            mark_price: Price::new_unchecked(price),
            timestamp: Timestamp::from_millis(ts),
        }
    }

    #[test]
    fn first_fill_creates_and_opens() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();

        let snap = engine
            .apply_fill(fill(&symbol, dec!(1), dec!(50000), 2))
            .unwrap()
            .unwrap();
        assert_eq!(snap.quantity, dec!(1));
        assert_eq!(snap.entry_price, dec!(50000));
        assert_eq!(snap.mark_price, dec!(50000));

        let opened = engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::PositionOpened(_)));
        assert!(opened);
    }

    #[test]
    fn same_side_fill_volume_weights_entry() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(1), dec!(50000), 2)).unwrap();

        let snap = engine
            .apply_fill(fill(&symbol, dec!(1), dec!(52000), 3))
            .unwrap()
            .unwrap();
        assert_eq!(snap.quantity, dec!(2));
        assert_eq!(snap.entry_price, dec!(51000)); // (50000 + 52000) / 2
    }

    #[test]
    fn reduce_keeps_entry_close_clears_it() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(2), dec!(50000), 2)).unwrap();

        let partial = engine
            .apply_fill(fill(&symbol, dec!(-1), dec!(52000), 3))
            .unwrap()
            .unwrap();
        assert_eq!(partial.quantity, dec!(1));
        assert_eq!(partial.entry_price, dec!(50000));

        let closed = engine
            .apply_fill(fill(&symbol, dec!(-1), dec!(53000), 4))
            .unwrap()
            .unwrap();
        assert!(closed.is_flat());
        assert_eq!(closed.entry_price, Decimal::ZERO);
        assert_eq!(closed.value, Decimal::ZERO);
        assert_eq!(closed.initial_margin, Decimal::ZERO);

        let closed_event = engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::PositionClosed(_)));
        assert!(closed_event);
    }

    #[test]
    fn short_side_adds_volume_weight_entry_too() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(-1), dec!(50000), 2)).unwrap();

        // adding to a short is the same side; reducing it is not
        let added = engine
            .apply_fill(fill(&symbol, dec!(-1), dec!(48000), 3))
            .unwrap()
            .unwrap();
        assert_eq!(added.quantity, dec!(-2));
        assert_eq!(added.entry_price, dec!(49000)); // (50000 + 48000) / 2

        let reduced = engine
            .apply_fill(fill(&symbol, dec!(1), dec!(47000), 4))
            .unwrap()
            .unwrap();
        assert_eq!(reduced.quantity, dec!(-1));
        assert_eq!(reduced.entry_price, dec!(49000));
    }

    #[test]
    fn flip_rebases_entry_at_fill_price() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(1), dec!(50000), 2)).unwrap();

        let snap = engine
            .apply_fill(fill(&symbol, dec!(-3), dec!(51000), 3))
            .unwrap()
            .unwrap();
        assert_eq!(snap.quantity, dec!(-2));
        assert_eq!(snap.entry_price, dec!(51000));
    }

    #[test]
    fn out_of_order_fill_discarded() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(1), dec!(50000), 10)).unwrap();

        let out = engine.apply_fill(fill(&symbol, dec!(1), dec!(40000), 5)).unwrap();
        assert!(out.is_none());

        // book unchanged
        let (_, slot) = engine.find_position(AccountId(1), &symbol).unwrap();
        assert_eq!(lock(&slot).quantity.value(), dec!(1));
    }

    #[test]
    fn zero_delta_fill_rejected() {
        let (engine, symbol) = engine_with_linear();
        let err = engine
            .apply_fill(fill(&symbol, Decimal::ZERO, dec!(50000), 1))
            .unwrap_err();
        assert_eq!(err, RiskError::EmptyFill);
    }

    #[test]
    fn unknown_symbol_rejected() {
        let (engine, _) = engine_with_linear();
        let err = engine
            .apply_fill(fill(&Symbol::from("ETH/USDT:USDT"), dec!(1), dec!(3000), 1))
            .unwrap_err();
        assert!(matches!(err, RiskError::UnknownSymbol(_)));
    }

    #[test]
    fn set_leverage_through_engine() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(1), dec!(50000), 2)).unwrap();

        let snap = engine
            .set_leverage(AccountId(1), &symbol, Leverage::new(dec!(10)).unwrap())
            .unwrap();
        assert_eq!(snap.leverage, dec!(10));
        assert_eq!(snap.initial_margin, dec!(5000));
    }

    #[test]
    fn margin_mode_switch_rekeys_book() {
        let (engine, symbol) = engine_with_linear();
        engine.apply_mark_price(mark(&symbol, dec!(50000), 1)).unwrap();
        engine.apply_fill(fill(&symbol, dec!(1), dec!(50000), 2)).unwrap();

        let key = engine
            .set_margin_mode(AccountId(1), &symbol, MarginMode::Cross)
            .unwrap();
        assert_eq!(key.margin_mode, MarginMode::Cross);

        let snap = engine.snapshot(&key).unwrap();
        assert_eq!(snap.margin_mode, MarginMode::Cross);
        // cross positions expose no isolated liquidation price
        assert_eq!(snap.liquidation_price, Decimal::ZERO);
    }
}
