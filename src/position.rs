// 4.0: the position entity. one per (account, symbol, margin-mode). raw fields
// are mutated by update(); derived risk figures are recomputed on demand by the
// update_* methods, reading the raw fields plus a funding snapshot. the split
// is deliberate: callers batch several raw mutations for one logical event and
// pay for recomputation once (see the engine's sequencing contract).
//
// 4.1 update() raw-field mutation
// 4.2 derived-field recomputation
// 4.3 pure risk queries (maintenance margin, bankruptcy price, fees, order cost)

use crate::contract::{ContractDescriptor, MarginMode};
use crate::errors::RiskError;
use crate::formulas::ContractFormulas;
use crate::funding::FundingSnapshot;
use crate::snapshot::PositionSnapshot;
use crate::types::{Leverage, Price, Side, SignedQty, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// FLAT <-> OPEN, driven solely by quantity. There is no separate closing
/// state; a position back at flat may reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Open,
}

/// Partial raw-field update. Omitted fields are left unchanged;
/// `quantity_delta` is additive, matching incremental-fill semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionDelta {
    pub quantity_delta: Option<Decimal>,
    pub mark_price: Option<Price>,
    pub entry_price: Option<Price>,
}

impl PositionDelta {
    pub fn quantity(delta: Decimal) -> Self {
        Self {
            quantity_delta: Some(delta),
            ..Self::default()
        }
    }

    pub fn mark(price: Price) -> Self {
        Self {
            mark_price: Some(price),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: Symbol,
    contract: Arc<ContractDescriptor>,
    pub margin_mode: MarginMode,

    // raw fields
    pub quantity: SignedQty,
    pub entry_price: Price,
    pub mark_price: Price,
    pub leverage: Leverage,
    /// Timestamp of the last applied fill. Fill ordering is path-dependent
    /// (entry price averaging), so the engine rejects older fills against it.
    pub last_fill_at: Timestamp,

    // derived fields. recomputed, never set directly.
    pub value: Decimal,
    pub unrealised_pnl: Decimal,
    pub initial_margin: Decimal,
    pub fee_to_open: Decimal,
    pub fee_to_close: Decimal,
    pub liquidation_price: Decimal,
}

impl Position {
    pub fn new(contract: Arc<ContractDescriptor>, margin_mode: MarginMode, leverage: Leverage) -> Self {
        Self {
            symbol: contract.symbol.clone(),
            contract,
            margin_mode,
            quantity: SignedQty::zero(),
            entry_price: Price::zero(),
            mark_price: Price::zero(),
            leverage,
            last_fill_at: Timestamp::from_millis(0),
            value: Decimal::ZERO,
            unrealised_pnl: Decimal::ZERO,
            initial_margin: Decimal::ZERO,
            fee_to_open: Decimal::ZERO,
            fee_to_close: Decimal::ZERO,
            liquidation_price: Decimal::ZERO,
        }
    }

    pub fn contract(&self) -> &Arc<ContractDescriptor> {
        &self.contract
    }

    fn formulas(&self) -> &'static dyn ContractFormulas {
        self.contract.contract_type.formulas()
    }

    pub fn state(&self) -> PositionState {
        if self.quantity.is_zero() {
            PositionState::Flat
        } else {
            PositionState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        !self.quantity.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        self.quantity.side()
    }

    // defaults to Long for a flat position so pure queries stay total
    fn side_or_long(&self) -> Side {
        self.quantity.side().unwrap_or(Side::Long)
    }

    // 4.1: raw-field mutation only. derived fields are left as-is on purpose;
    // the caller decides which recomputations follow and when.
    pub fn update(&mut self, delta: PositionDelta) -> Result<(), RiskError> {
        if self.leverage > self.contract.max_leverage {
            return Err(RiskError::LeverageOutOfBounds {
                symbol: self.symbol.clone(),
                requested: self.leverage,
                max: self.contract.max_leverage,
            });
        }

        let old_quantity = self.quantity;

        if let Some(mark) = delta.mark_price {
            self.mark_price = mark;
        }
        if let Some(entry) = delta.entry_price {
            self.entry_price = entry;
        }
        if let Some(d) = delta.quantity_delta {
            self.quantity = self.quantity.add(d);
        }

        if self.quantity.is_zero() {
            // back to flat: the exposure and its average entry are gone
            self.entry_price = Price::zero();
        } else if delta.entry_price.is_none() {
            let opened = old_quantity.is_zero();
            let flipped = old_quantity.value() * self.quantity.value() < Decimal::ZERO;
            if (opened && self.entry_price.is_zero()) || flipped {
                // a fresh exposure with no stated entry adopts the mark
                self.entry_price = self.mark_price;
            }
        }

        Ok(())
    }

    // 4.2: derived-field recomputation. each method is a pure function of the
    // raw fields and (where needed) the funding snapshot.

    pub fn update_value(&mut self) {
        self.value = self
            .formulas()
            .value(self.quantity, self.mark_price, self.contract.contract_size);
    }

    pub fn update_pnl(&mut self) {
        self.unrealised_pnl = self.formulas().unrealised_pnl(
            self.quantity,
            self.entry_price,
            self.mark_price,
            self.contract.contract_size,
        );
    }

    pub fn update_initial_margin(&mut self) {
        self.initial_margin = self.formulas().initial_margin(
            self.quantity,
            self.mark_price,
            self.leverage,
            self.contract.contract_size,
        );
    }

    pub fn update_fee_to_open(&mut self) {
        self.fee_to_open = self.get_fee_to_open();
    }

    pub fn update_fee_to_close(&mut self) {
        self.fee_to_close = self.formulas().fee_to_close(
            self.quantity,
            self.get_bankruptcy_price(false),
            self.contract.taker_fee_rate,
            self.contract.contract_size,
        );
    }

    /// Isolated-margin liquidation price. Refuses to produce a number for a
    /// cross-margin position: cross liquidation depends on account-wide
    /// equity this entity cannot see.
    pub fn update_isolated_liquidation_price(
        &mut self,
        funding: &FundingSnapshot,
    ) -> Result<(), RiskError> {
        if self.margin_mode == MarginMode::Cross {
            return Err(RiskError::CrossLiquidationUnsupported);
        }
        if self.quantity.is_zero() {
            self.liquidation_price = Decimal::ZERO;
            return Ok(());
        }
        self.liquidation_price = self.formulas().isolated_liquidation_price(
            self.side_or_long(),
            self.entry_price,
            self.leverage,
            self.maintenance_margin_rate(funding),
        );
        Ok(())
    }

    /// Full recompute sweep in the defined order. Cross positions skip the
    /// liquidation price (it stays zero) without erroring.
    pub fn refresh(&mut self, funding: &FundingSnapshot) -> Result<(), RiskError> {
        self.update_value();
        self.update_pnl();
        self.update_initial_margin();
        self.update_fee_to_open();
        self.update_fee_to_close();
        if self.margin_mode == MarginMode::Isolated {
            self.update_isolated_liquidation_price(funding)?;
        } else {
            self.liquidation_price = Decimal::ZERO;
        }
        Ok(())
    }

    /// Changing leverage re-validates against the contract cap and forces
    /// the leverage-dependent derived fields current.
    pub fn set_leverage(
        &mut self,
        leverage: Leverage,
        funding: &FundingSnapshot,
    ) -> Result<(), RiskError> {
        if leverage > self.contract.max_leverage {
            return Err(RiskError::LeverageOutOfBounds {
                symbol: self.symbol.clone(),
                requested: leverage,
                max: self.contract.max_leverage,
            });
        }
        self.leverage = leverage;
        self.update_initial_margin();
        self.update_fee_to_close();
        if self.margin_mode == MarginMode::Isolated {
            self.update_isolated_liquidation_price(funding)?;
        }
        Ok(())
    }

    /// Swap in a refreshed contract descriptor. Fails if the current
    /// leverage no longer fits under the new cap; the old descriptor is kept
    /// in that case.
    pub fn set_contract(&mut self, contract: Arc<ContractDescriptor>) -> Result<(), RiskError> {
        if self.leverage > contract.max_leverage {
            return Err(RiskError::LeverageOutOfBounds {
                symbol: self.symbol.clone(),
                requested: self.leverage,
                max: contract.max_leverage,
            });
        }
        self.contract = contract;
        Ok(())
    }

    /// Margin-mode changes are an explicit external operation; price and
    /// quantity updates never flip this. The liquidation price is cleared,
    /// callers refresh afterwards.
    pub fn set_margin_mode(&mut self, mode: MarginMode) {
        self.margin_mode = mode;
        self.liquidation_price = Decimal::ZERO;
    }

    // 4.3: pure risk queries. none of these mutate state.

    /// Funding-adjusted maintenance margin rate: descriptor rate at the
    /// current notional tier plus the signed live funding rate. This is why
    /// maintenance math reads the funding snapshot instead of a cached copy.
    fn maintenance_margin_rate(&self, funding: &FundingSnapshot) -> Decimal {
        let notional = self.formulas().quote_notional(
            self.quantity,
            self.mark_price,
            self.contract.contract_size,
        );
        self.contract.maintenance_margin_rate_for(notional) + funding.funding_rate
    }

    pub fn calculate_maintenance_margin(&self, funding: &FundingSnapshot) -> Decimal {
        self.formulas().maintenance_margin(
            self.quantity,
            self.mark_price,
            self.maintenance_margin_rate(funding),
            self.contract.contract_size,
        )
    }

    /// Price at which equity is exactly exhausted. `with_mark_price` selects
    /// the mark-anchored output convention instead of the entry-anchored one.
    pub fn get_bankruptcy_price(&self, with_mark_price: bool) -> Decimal {
        self.formulas().bankruptcy_price(
            self.side_or_long(),
            self.entry_price,
            self.mark_price,
            self.leverage,
            with_mark_price,
        )
    }

    pub fn get_fee_to_open(&self) -> Decimal {
        self.get_fee_to_open_with(false)
    }

    pub fn get_fee_to_open_with(&self, maker: bool) -> Decimal {
        self.formulas().fee_to_open(
            self.quantity,
            self.mark_price,
            self.contract.fee_rate(maker),
            self.contract.contract_size,
        )
    }

    /// Margin plus both fees: what opening this exposure locks up.
    /// Computed live from raw fields, independent of the cached derived set.
    pub fn get_order_cost(&self) -> Decimal {
        let formulas = self.formulas();
        let margin = formulas.initial_margin(
            self.quantity,
            self.mark_price,
            self.leverage,
            self.contract.contract_size,
        );
        let fee_open = formulas.fee_to_open(
            self.quantity,
            self.mark_price,
            self.contract.taker_fee_rate,
            self.contract.contract_size,
        );
        let fee_close = formulas.fee_to_close(
            self.quantity,
            self.get_bankruptcy_price(false),
            self.contract.taker_fee_rate,
            self.contract.contract_size,
        );
        margin + fee_open + fee_close
    }

    /// True when the mark has crossed the cached isolated liquidation price.
    /// A zero mark means the position is not marked; it carries no risk signal.
    pub fn is_liquidatable(&self, mark: Price) -> bool {
        if self.margin_mode != MarginMode::Isolated
            || self.quantity.is_zero()
            || self.liquidation_price.is_zero()
            || mark.is_zero()
        {
            return false;
        }
        match self.side_or_long() {
            Side::Long => mark.value() <= self.liquidation_price,
            Side::Short => mark.value() >= self.liquidation_price,
        }
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            symbol: self.symbol.clone(),
            quantity: self.quantity.value(),
            entry_price: self.entry_price.value(),
            mark_price: self.mark_price.value(),
            leverage: self.leverage.value(),
            margin_mode: self.margin_mode,
            value: self.value,
            unrealised_pnl: self.unrealised_pnl,
            initial_margin: self.initial_margin,
            liquidation_price: self.liquidation_price,
            fee_to_open: self.fee_to_open,
            fee_to_close: self.fee_to_close,
        }
    }
}
