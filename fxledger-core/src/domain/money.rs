//! Rounding policy for amounts and rates
//!
//! Every monetary amount and every exchange rate in the ledger carries exactly
//! two fractional digits, rounded half-up (midpoint away from zero). The live
//! engine and the replay fold both go through these helpers so that a
//! reconstructed balance reproduces the committed one to the cent.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept for amounts and rates
pub const SCALE: u32 = 2;

/// Largest magnitude a stored amount may take: the `DECIMAL(18,2)` range,
/// 9999999999999999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, SCALE);

/// Round to two decimal places, half-up
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount credited when `amount` is converted at `rate`
pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
    round(amount * rate)
}

/// Whether a rounded value fits in the stored amount range
pub fn in_range(value: Decimal) -> bool {
    value.abs() <= MAX_AMOUNT
}

/// `a + b`, rounded, or `None` when the sum leaves the stored amount range
pub fn checked_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_add(b).map(round).filter(|sum| in_range(*sum))
}

/// [`convert`], or `None` when the credited amount leaves the stored amount range
pub fn checked_convert(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    amount.checked_mul(rate).map(round).filter(|credited| in_range(*credited))
}

/// Reciprocal of a rate, rounded like any other rate
///
/// Returns `None` for a zero rate.
pub fn reciprocal(rate: Decimal) -> Option<Decimal> {
    if rate.is_zero() {
        return None;
    }
    Some(round(Decimal::ONE / rate))
}
