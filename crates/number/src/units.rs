//! Conversions between on-chain token amounts and human readable decimals.
//!
//! Both the settlement contract and the payment token use 18 decimals, so an
//! on-chain `U256` of `60 * 10^18` is the decimal `60`.

use {
    crate::conversions::{big_decimal_to_u256, u256_to_big_int},
    alloy::primitives::U256,
    bigdecimal::BigDecimal,
    num::BigInt,
};

pub const DECIMALS: i64 = 18;

/// Interprets an on-chain amount as a decimal with [`DECIMALS`] places.
pub fn from_wei(amount: &U256) -> BigDecimal {
    BigDecimal::new(u256_to_big_int(amount), DECIMALS).normalized()
}

/// Scales a decimal to its on-chain representation. Digits beyond
/// [`DECIMALS`] places are truncated. Returns `None` for negative values or
/// values that do not fit into a `U256`.
pub fn to_wei(amount: &BigDecimal) -> Option<U256> {
    let scaled = amount * BigDecimal::new(BigInt::from(1), -DECIMALS);
    big_decimal_to_u256(&scaled.with_scale(0))
}
