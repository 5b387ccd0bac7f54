//! Conversions between 18-decimal integer amounts and whole-unit decimals.
//!
//! Chain values arrive as integers scaled by 10^18. Internally every amount is
//! a [`Decimal`] in whole units; conversion back to integers always floors so
//! that signed figures never exceed what was computed.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Decimal places of ETH, DAI and the settlement token.
pub const WEI_DECIMALS: u32 = 18;

/// Errors converting between wei and whole units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitsError {
    /// The integer does not fit the 96-bit decimal mantissa.
    #[error("amount {0} is too large for decimal arithmetic")]
    Overflow(u128),

    /// The decimal is negative or does not fit in a `u128` once scaled.
    #[error("amount {0} cannot be expressed as unsigned wei")]
    OutOfRange(Decimal),
}

/// Converts an 18-decimal integer into whole units.
///
/// # Errors
///
/// Returns [`UnitsError::Overflow`] when the value exceeds the decimal range
/// (about 7.9 × 10^10 whole units).
pub fn from_wei(wei: u128) -> Result<Decimal, UnitsError> {
    let signed = i128::try_from(wei).map_err(|_| UnitsError::Overflow(wei))?;
    Decimal::try_from_i128_with_scale(signed, WEI_DECIMALS).map_err(|_| UnitsError::Overflow(wei))
}

/// Converts whole units into an 18-decimal integer, rounding toward zero.
///
/// # Errors
///
/// Returns [`UnitsError::OutOfRange`] for negative values or on overflow.
pub fn to_wei_floor(amount: Decimal) -> Result<u128, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::OutOfRange(amount));
    }
    let int_part = amount.trunc();
    let frac_part = amount - int_part;
    let whole = int_part.to_u128().ok_or(UnitsError::OutOfRange(amount))?;
    let frac = (frac_part * Decimal::from(WEI_FACTOR))
        .floor()
        .to_u128()
        .ok_or(UnitsError::OutOfRange(amount))?;
    whole
        .checked_mul(u128::from(WEI_FACTOR))
        .and_then(|w| w.checked_add(frac))
        .ok_or(UnitsError::OutOfRange(amount))
}

const WEI_FACTOR: u64 = 1_000_000_000_000_000_000;
