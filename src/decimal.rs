//! # decimal
//!
//! Fixed-point money math on top of [`BigDecimal`].
//!
//! | Quantity   | Scale | Example     |
//! |------------|-------|-------------|
//! | Money      | 2     | `1000.00`   |
//! | Shares     | 4     | `20.0000`   |
//! | Percent    | 2     | `10.00` (already ×100) |
//!
//! Every operation rounds **once**, half-up, at its own scale.  `f64` only
//! appears at the edges ([`from_f64`] / [`to_f64`]); intermediate values never
//! touch binary floating point.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};
use tracing::warn;

use crate::error::PositionError;

pub const MONEY_SCALE: i64 = 2;
pub const SHARE_SCALE: i64 = 4;
pub const PERCENT_SCALE: i64 = 2;

// ─── Boundary Conversion ──────────────────────────────────────────────────────

/// Parse a wire `f64` into a fixed-point value at `scale`.
///
/// Goes through the shortest round-trip decimal text of the float, so
/// `0.1 + 0.2` becomes `0.30` rather than `0.30000000000000004441…`.
pub fn from_f64(value: f64, scale: i64) -> Result<BigDecimal, PositionError> {
    if !value.is_finite() {
        return Err(PositionError::InvalidQuantity(format!("non-finite value: {value}")));
    }
    let parsed = BigDecimal::from_str(&value.to_string())
        .map_err(|e| PositionError::InvalidQuantity(format!("{value}: {e}")))?;
    Ok(round(&parsed, scale))
}

pub fn money(value: f64) -> Result<BigDecimal, PositionError> {
    from_f64(value, MONEY_SCALE)
}

/// Outbound conversion for values that must stay exact on the wire.
pub fn try_to_f64(value: &BigDecimal) -> Result<f64, PositionError> {
    match value.to_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(PositionError::InvalidQuantity(format!("{value} has no finite f64 form"))),
    }
}

/// Display-only conversion (dashboards, event payloads).
pub fn to_f64(value: &BigDecimal) -> f64 {
    try_to_f64(value).unwrap_or_else(|e| {
        warn!(error = %e, "Reporting 0.0 for unconvertible value");
        0.0
    })
}

// ─── Primitive Operations ─────────────────────────────────────────────────────

#[inline]
pub fn round(value: &BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfUp)
}

/// `lhs / rhs` rounded half-up at `scale`.
pub fn divide_money(
    lhs:   &BigDecimal,
    rhs:   &BigDecimal,
    scale: i64,
) -> Result<BigDecimal, PositionError> {
    if rhs.is_zero() {
        return Err(PositionError::InvalidQuantity(format!("division of {lhs} by zero")));
    }
    Ok(round(&(lhs / rhs), scale))
}

/// `lhs × rhs` rounded half-up at `scale`.
pub fn multiply_money(lhs: &BigDecimal, rhs: &BigDecimal, scale: i64) -> BigDecimal {
    round(&(lhs * rhs), scale)
}

pub fn add(lhs: &BigDecimal, rhs: &BigDecimal) -> BigDecimal {
    round(&(lhs + rhs), MONEY_SCALE)
}

pub fn subtract(lhs: &BigDecimal, rhs: &BigDecimal) -> BigDecimal {
    round(&(lhs - rhs), MONEY_SCALE)
}

/// Numeric comparison; `20.00` and `20.0000` compare equal.
#[inline]
pub fn compare(lhs: &BigDecimal, rhs: &BigDecimal) -> Ordering {
    lhs.cmp(rhs)
}

#[inline]
pub fn is_positive(value: &BigDecimal) -> bool {
    compare(value, &BigDecimal::zero()) == Ordering::Greater
}

// ─── Position Math ────────────────────────────────────────────────────────────

/// Returns the balance that remains after spending `cost`.
///
/// Spending exactly the available balance is allowed.
pub fn check_balance(
    available: &BigDecimal,
    cost:      &BigDecimal,
) -> Result<BigDecimal, PositionError> {
    let available = round(available, MONEY_SCALE);
    let cost = round(cost, MONEY_SCALE);

    if compare(&available, &cost) == Ordering::Less {
        return Err(PositionError::InsufficientFunds { need: cost, available });
    }
    Ok(subtract(&available, &cost))
}

/// How many shares `funds` buys at `price`, at 4 decimal places.
pub fn share_quantity(funds: &BigDecimal, price: &BigDecimal) -> Result<BigDecimal, PositionError> {
    divide_money(&round(funds, MONEY_SCALE), &round(price, MONEY_SCALE), SHARE_SCALE)
}

/// Result of marking a position to market at close.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// `price × quantity`: what gets credited back to the account.
    pub current_value: BigDecimal,
    /// `current_value / cost_basis × 100 − 100`
    pub pnl_percent:   BigDecimal,
    /// `current_value − cost_basis`
    pub absolute_pnl:  BigDecimal,
    /// `available + current_value`
    pub new_balance:   BigDecimal,
}

pub fn settle(
    cost_basis: &BigDecimal,
    quantity:   &BigDecimal,
    price:      &BigDecimal,
    available:  &BigDecimal,
) -> Result<Settlement, PositionError> {
    let hundred = BigDecimal::from(100);

    let current_value = multiply_money(
        &round(price, MONEY_SCALE),
        &round(quantity, SHARE_SCALE),
        MONEY_SCALE,
    );
    let ratio = divide_money(&(&current_value * &hundred), cost_basis, PERCENT_SCALE)?;
    let pnl_percent = round(&(ratio - hundred), PERCENT_SCALE);

    Ok(Settlement {
        absolute_pnl: subtract(&current_value, cost_basis),
        new_balance:  add(available, &current_value),
        current_value,
        pnl_percent,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
