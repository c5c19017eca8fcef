//! Property-based tests for the risk math.
//!
//! These tests verify invariants hold under random inputs.

use risk_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn qty_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|x| Decimal::new(x, 2)) // 0.01 to 10,000 contracts
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=50u32).prop_map(Decimal::from) // 1x to 50x
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=200i64).prop_map(|x| Decimal::new(x, 4)) // 0.01% to 2%
}

fn open_position(contract: ContractDescriptor, qty: Decimal, mark: Decimal) -> Position {
    let mut pos = Position::new(Arc::new(contract), MarginMode::Isolated, Leverage::one());
    pos.update(PositionDelta {
        quantity_delta: Some(qty),
        mark_price: Some(Price::new_unchecked(mark)),
        entry_price: None,
    })
    .unwrap();
    pos
}

proptest! {
    /// A flat position derives nothing, whatever the market does.
    #[test]
    fn flat_position_derives_all_zero(mark in price_strategy(), rate in rate_strategy()) {
        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = Position::new(Arc::new(contract), MarginMode::Isolated, Leverage::one());
            pos.update(PositionDelta::mark(Price::new_unchecked(mark))).unwrap();
            pos.refresh(&FundingSnapshot::with_rate(rate)).unwrap();

            prop_assert_eq!(pos.value, Decimal::ZERO);
            prop_assert_eq!(pos.unrealised_pnl, Decimal::ZERO);
            prop_assert_eq!(pos.initial_margin, Decimal::ZERO);
            prop_assert_eq!(pos.liquidation_price, Decimal::ZERO);
            prop_assert_eq!(pos.get_order_cost(), Decimal::ZERO);
        }
    }

    /// PnL is zero when mark = entry, for both settlement models.
    #[test]
    fn pnl_zero_at_entry(qty in qty_strategy(), price in price_strategy()) {
        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = open_position(contract, qty, price);
            pos.update_pnl();
            prop_assert_eq!(pos.unrealised_pnl, Decimal::ZERO);
        }
    }

    /// Linear PnL sign follows the position: longs profit when mark > entry,
    /// shorts mirror it exactly.
    #[test]
    fn linear_pnl_sign_and_mirror(
        qty in qty_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
    ) {
        let formulas = ContractType::Linear.formulas();
        let entry_p = Price::new_unchecked(entry);
        let mark_p = Price::new_unchecked(mark);

        let long = formulas.unrealised_pnl(SignedQty::new(qty), entry_p, mark_p, Decimal::ONE);
        let short = formulas.unrealised_pnl(SignedQty::new(-qty), entry_p, mark_p, Decimal::ONE);

        prop_assert_eq!(long, -short);
        if mark > entry {
            prop_assert!(long > Decimal::ZERO);
        } else if mark < entry {
            prop_assert!(long < Decimal::ZERO);
        }
    }

    /// Raising leverage strictly shrinks the initial margin of an open
    /// position.
    #[test]
    fn higher_leverage_needs_less_initial_margin(
        qty in qty_strategy(),
        price in price_strategy(),
        low in leverage_strategy(),
        high in leverage_strategy(),
    ) {
        prop_assume!(low < high);
        let funding = FundingSnapshot {
            mark_price: Price::new_unchecked(price),
            funding_rate: Decimal::ZERO,
        };

        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = open_position(contract, qty, price);
            pos.set_leverage(Leverage::new(low).unwrap(), &funding).unwrap();
            let margin_low = pos.initial_margin;
            pos.set_leverage(Leverage::new(high).unwrap(), &funding).unwrap();
            let margin_high = pos.initial_margin;

            prop_assert!(margin_high < margin_low);
        }
    }

    /// Raising leverage pulls the liquidation price strictly closer to the
    /// entry price.
    #[test]
    fn higher_leverage_tightens_liquidation(
        qty in qty_strategy(),
        price in price_strategy(),
        low in leverage_strategy(),
        high in leverage_strategy(),
        short in any::<bool>(),
    ) {
        prop_assume!(low < high);
        let funding = FundingSnapshot {
            mark_price: Price::new_unchecked(price),
            funding_rate: Decimal::ZERO,
        };
        let signed = if short { -qty } else { qty };

        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = open_position(contract, signed, price);
            pos.set_leverage(Leverage::new(low).unwrap(), &funding).unwrap();
            let dist_low = (pos.entry_price.value() - pos.liquidation_price).abs();
            pos.set_leverage(Leverage::new(high).unwrap(), &funding).unwrap();
            let dist_high = (pos.entry_price.value() - pos.liquidation_price).abs();

            prop_assert!(dist_high < dist_low);
        }
    }

    /// A long liquidates below entry, a short above; the bankruptcy price
    /// sits beyond the liquidation price on the same side.
    #[test]
    fn liquidation_brackets_entry(
        qty in qty_strategy(),
        price in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        prop_assume!(leverage > Decimal::ONE);
        let funding = FundingSnapshot {
            mark_price: Price::new_unchecked(price),
            funding_rate: Decimal::ZERO,
        };

        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut long = open_position(contract.clone(), qty, price);
            long.set_leverage(Leverage::new(leverage).unwrap(), &funding).unwrap();
            prop_assert!(long.liquidation_price < long.entry_price.value());
            prop_assert!(long.get_bankruptcy_price(false) < long.liquidation_price);

            let mut short = open_position(contract, -qty, price);
            short.set_leverage(Leverage::new(leverage).unwrap(), &funding).unwrap();
            prop_assert!(short.liquidation_price > short.entry_price.value());
            prop_assert!(short.get_bankruptcy_price(false) > short.liquidation_price);
        }
    }

    /// Order cost always covers the initial margin plus the opening fee.
    #[test]
    fn order_cost_dominates_margin_plus_open_fee(
        qty in qty_strategy(),
        price in price_strategy(),
    ) {
        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = open_position(contract, qty, price);
            pos.update_initial_margin();
            pos.update_fee_to_open();
            prop_assert!(pos.get_order_cost() >= pos.initial_margin + pos.fee_to_open);
        }
    }

    /// Applying a fill and its exact inverse restores every derived figure.
    #[test]
    fn opposite_fills_cancel(
        qty in qty_strategy(),
        delta in qty_strategy(),
        price in price_strategy(),
    ) {
        let funding = FundingSnapshot {
            mark_price: Price::new_unchecked(price),
            funding_rate: dec!(0.0001),
        };

        for contract in [ContractDescriptor::btc_usd_inverse(), ContractDescriptor::btc_usdt_linear()] {
            let mut pos = open_position(contract, qty, price);
            pos.refresh(&funding).unwrap();
            let before = pos.snapshot();

            pos.update(PositionDelta::quantity(delta)).unwrap();
            pos.refresh(&funding).unwrap();
            pos.update(PositionDelta::quantity(-delta)).unwrap();
            pos.refresh(&funding).unwrap();

            prop_assert_eq!(pos.snapshot(), before);
        }
    }
}
