use crate::error::{FulfillmentError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Largest amount (in sums) the ledger will ever convert.
pub const MAX_SUMS: Decimal = dec!(10000000);
/// `MAX_SUMS` expressed in tiyin.
pub const MAX_TIYIN: i64 = 1_000_000_000;
/// Rounding slack accepted when a provider echoes an amount back.
pub const AMOUNT_TOLERANCE_TIYIN: i64 = 1;

/// Minor currency unit (1/100 of a sum) used on the provider wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tiyin(pub i64);

impl Tiyin {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs_diff(self, other: Tiyin) -> i64 {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for Tiyin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Tiyin {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Tiyin {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Rounds a ledger amount to two decimal places, half-up.
pub fn round_sums(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a ledger amount (major units) into provider minor units.
///
/// Rounds half-up to the nearest tiyin. Negative amounts and amounts above
/// [`MAX_SUMS`] are rejected.
pub fn sums_to_tiyin(sums: Decimal) -> Result<Tiyin> {
    if sums.is_sign_negative() && !sums.is_zero() {
        return Err(FulfillmentError::validation(format!(
            "Amount cannot be negative: {sums}"
        )));
    }
    if sums > MAX_SUMS {
        return Err(FulfillmentError::validation(format!(
            "Amount too large: {sums} (max: {MAX_SUMS})"
        )));
    }

    let scaled = (sums * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    scaled
        .to_i64()
        .map(Tiyin)
        .ok_or_else(|| FulfillmentError::validation(format!("Amount out of range: {sums}")))
}

/// Converts provider minor units back into a two-decimal ledger amount.
pub fn tiyin_to_sums(tiyin: Tiyin) -> Result<Decimal> {
    if tiyin.0 < 0 {
        return Err(FulfillmentError::validation(format!(
            "Amount cannot be negative: {tiyin}"
        )));
    }
    if tiyin.0 > MAX_TIYIN {
        return Err(FulfillmentError::validation(format!(
            "Amount too large: {tiyin} (max: {MAX_TIYIN})"
        )));
    }
    Ok(Decimal::new(tiyin.0, 2))
}

/// Returns true when `received` is within [`AMOUNT_TOLERANCE_TIYIN`] of `expected`.
///
/// An `expected` amount that cannot be converted never matches.
pub fn amount_matches(expected: Decimal, received: Tiyin) -> bool {
    match sums_to_tiyin(expected) {
        Ok(expected_tiyin) => {
            let difference = expected_tiyin.abs_diff(received);
            if difference > AMOUNT_TOLERANCE_TIYIN {
                tracing::warn!(
                    expected = %expected_tiyin,
                    received = %received,
                    difference,
                    "amount mismatch"
                );
                false
            } else {
                true
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot validate amount");
            false
        }
    }
}

/// Inclusive range of payment totals the ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl Default for AmountBounds {
    fn default() -> Self {
        Self {
            min: dec!(1000),
            max: MAX_SUMS,
        }
    }
}

impl AmountBounds {
    pub fn contains(&self, amount: Decimal) -> bool {
        self.min <= amount && amount <= self.max
    }

    pub fn validate(&self, amount: Decimal) -> Result<Decimal> {
        if self.contains(amount) {
            Ok(amount)
        } else {
            Err(FulfillmentError::validation(format!(
                "Payment amount {amount} outside [{}, {}]",
                self.min, self.max
            )))
        }
    }
}
