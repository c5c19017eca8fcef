// 3.0: the contract-type strategy. linear and inverse settlement share one trait;
// a position picks its formula set once from its descriptor's contract type.
// every method is pure decimal arithmetic over the caller's fields.
//
// division-by-zero convention (applies crate-wide): any formula whose
// denominator (mark price, entry price, or a liquidation/bankruptcy
// denominator) is zero evaluates to ZERO, even for a nonzero quantity. a zero
// mark or entry means the position has not been marked yet; the figure does
// not exist, and zero is the one value every downstream consumer treats as
// "nothing at risk". a flat quantity short-circuits to ZERO before any
// division is reached.

use crate::contract::ContractType;
use crate::types::{Leverage, Price, Side, SignedQty};
use rust_decimal::Decimal;

#[inline]
fn div_or_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Formula set varying by settlement model. `rate` arguments are the
/// funding-adjusted maintenance margin rate (descriptor rate + live funding
/// rate); callers assemble it from a consistent funding snapshot.
pub trait ContractFormulas: Send + Sync {
    /// Signed position value in settlement units.
    fn value(&self, qty: SignedQty, mark: Price, size: Decimal) -> Decimal;

    /// Unrealized PnL in settlement units. Sign follows the position.
    fn unrealised_pnl(&self, qty: SignedQty, entry: Price, mark: Price, size: Decimal) -> Decimal;

    fn initial_margin(
        &self,
        qty: SignedQty,
        mark: Price,
        leverage: Leverage,
        size: Decimal,
    ) -> Decimal;

    fn maintenance_margin(&self, qty: SignedQty, mark: Price, rate: Decimal, size: Decimal)
        -> Decimal;

    /// Price at which an isolated position breaches its maintenance
    /// requirement. Zero for a flat position.
    fn isolated_liquidation_price(
        &self,
        side: Side,
        entry: Price,
        leverage: Leverage,
        rate: Decimal,
    ) -> Decimal;

    /// Price at which equity is exactly exhausted (no maintenance buffer).
    /// `with_mark_price` switches the output convention from entry-anchored
    /// to mark-anchored units; both call sites are legitimate and distinct.
    fn bankruptcy_price(
        &self,
        side: Side,
        entry: Price,
        mark: Price,
        leverage: Leverage,
        with_mark_price: bool,
    ) -> Decimal;

    fn fee_to_open(&self, qty: SignedQty, mark: Price, fee_rate: Decimal, size: Decimal) -> Decimal;

    /// Fee to close, charged at the bankruptcy price: the worst-case exit.
    fn fee_to_close(
        &self,
        qty: SignedQty,
        bankruptcy_price: Decimal,
        fee_rate: Decimal,
        size: Decimal,
    ) -> Decimal;

    /// Quote-denominated notional used for maintenance tier lookup.
    fn quote_notional(&self, qty: SignedQty, mark: Price, size: Decimal) -> Decimal;
}

impl ContractType {
    pub fn formulas(&self) -> &'static dyn ContractFormulas {
        match self {
            ContractType::Linear => &LinearFormulas,
            ContractType::Inverse => &InverseFormulas,
        }
    }
}

// 3.1: linear contracts settle in quote currency. pnl scales linearly with price.
pub struct LinearFormulas;

impl ContractFormulas for LinearFormulas {
    fn value(&self, qty: SignedQty, mark: Price, size: Decimal) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.value() * mark.value() * size
    }

    fn unrealised_pnl(&self, qty: SignedQty, entry: Price, mark: Price, size: Decimal) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.value() * (mark.value() - entry.value()) * size
    }

    fn initial_margin(
        &self,
        qty: SignedQty,
        mark: Price,
        leverage: Leverage,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.abs() * mark.value() * size / leverage.value()
    }

    fn maintenance_margin(
        &self,
        qty: SignedQty,
        mark: Price,
        rate: Decimal,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.abs() * mark.value() * size * rate
    }

    fn isolated_liquidation_price(
        &self,
        side: Side,
        entry: Price,
        leverage: Leverage,
        rate: Decimal,
    ) -> Decimal {
        let imf = leverage.initial_margin_fraction();
        let price = match side {
            Side::Long => entry.value() * (Decimal::ONE - imf + rate),
            Side::Short => entry.value() * (Decimal::ONE + imf - rate),
        };
        price.max(Decimal::ZERO)
    }

    fn bankruptcy_price(
        &self,
        side: Side,
        entry: Price,
        mark: Price,
        leverage: Leverage,
        with_mark_price: bool,
    ) -> Decimal {
        let anchor = if with_mark_price { mark } else { entry };
        let imf = leverage.initial_margin_fraction();
        let price = match side {
            Side::Long => anchor.value() * (Decimal::ONE - imf),
            Side::Short => anchor.value() * (Decimal::ONE + imf),
        };
        price.max(Decimal::ZERO)
    }

    fn fee_to_open(&self, qty: SignedQty, mark: Price, fee_rate: Decimal, size: Decimal) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.abs() * mark.value() * size * fee_rate
    }

    fn fee_to_close(
        &self,
        qty: SignedQty,
        bankruptcy_price: Decimal,
        fee_rate: Decimal,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        qty.abs() * bankruptcy_price * size * fee_rate
    }

    fn quote_notional(&self, qty: SignedQty, mark: Price, size: Decimal) -> Decimal {
        qty.abs() * mark.value() * size
    }
}

// 3.2: inverse contracts settle in base currency against a quote-denominated
// notional, so every figure carries a reciprocal price term.
pub struct InverseFormulas;

impl ContractFormulas for InverseFormulas {
    fn value(&self, qty: SignedQty, mark: Price, size: Decimal) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        div_or_zero(qty.value() * size, mark.value())
    }

    // long: qty*size/entry - qty*size/mark, short is the mirrored form with
    // qty keeping its sign. either price at zero means the position has no
    // marked pnl yet.
    fn unrealised_pnl(&self, qty: SignedQty, entry: Price, mark: Price, size: Decimal) -> Decimal {
        if qty.is_zero() || entry.is_zero() || mark.is_zero() {
            return Decimal::ZERO;
        }
        let notional = qty.value() * size;
        if qty.is_long() {
            notional / entry.value() - notional / mark.value()
        } else {
            notional / mark.value() - notional / entry.value()
        }
    }

    fn initial_margin(
        &self,
        qty: SignedQty,
        mark: Price,
        leverage: Leverage,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        div_or_zero(qty.abs() * size, mark.value() * leverage.value())
    }

    fn maintenance_margin(
        &self,
        qty: SignedQty,
        mark: Price,
        rate: Decimal,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        div_or_zero(qty.abs() * size, mark.value()) * rate
    }

    // closed-form roots of the equity break-even equation:
    //   long:  entry * lev / (lev + 1 - rate * lev)
    //   short: entry * lev / (lev - 1 + rate * lev)
    fn isolated_liquidation_price(
        &self,
        side: Side,
        entry: Price,
        leverage: Leverage,
        rate: Decimal,
    ) -> Decimal {
        let lev = leverage.value();
        let denominator = match side {
            Side::Long => lev + Decimal::ONE - rate * lev,
            Side::Short => lev - Decimal::ONE + rate * lev,
        };
        div_or_zero(entry.value() * lev, denominator).max(Decimal::ZERO)
    }

    // same equation solved for equity == 0. the short side at 1x has no
    // finite bankruptcy price (lev - 1 == 0) and yields zero.
    fn bankruptcy_price(
        &self,
        side: Side,
        entry: Price,
        mark: Price,
        leverage: Leverage,
        with_mark_price: bool,
    ) -> Decimal {
        let lev = leverage.value();
        let denominator = match side {
            Side::Long => lev + Decimal::ONE,
            Side::Short => lev - Decimal::ONE,
        };
        let numerator = if with_mark_price {
            mark.value()
        } else {
            entry.value() * lev
        };
        div_or_zero(numerator, denominator).max(Decimal::ZERO)
    }

    fn fee_to_open(&self, qty: SignedQty, mark: Price, fee_rate: Decimal, size: Decimal) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        div_or_zero(qty.abs() * size, mark.value()) * fee_rate
    }

    fn fee_to_close(
        &self,
        qty: SignedQty,
        bankruptcy_price: Decimal,
        fee_rate: Decimal,
        size: Decimal,
    ) -> Decimal {
        if qty.is_zero() {
            return Decimal::ZERO;
        }
        div_or_zero(qty.abs() * size, bankruptcy_price) * fee_rate
    }

    fn quote_notional(&self, qty: SignedQty, _mark: Price, size: Decimal) -> Decimal {
        qty.abs() * size
    }
}
