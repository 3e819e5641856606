//! Exact decimal arithmetic for protocol amounts.
//!
//! Every monetary quantity in the indexer is an arbitrary-precision signed
//! decimal. Floats never enter the interpreter; where the protocol calls for
//! rounding it is an explicit floor at 18 fractional digits.

use bigdecimal::num_bigint::BigInt;
pub use bigdecimal::{BigDecimal as Decimal, RoundingMode};
use num_traits::One;

/// Number of fractional digits every protocol amount is carried at.
pub const PROTOCOL_SCALE: i64 = 18;

/// The smallest positive protocol amount, `1e-18`.
pub fn min_unit() -> Decimal {
    Decimal::new(BigInt::one(), PROTOCOL_SCALE)
}

/// Parses a decimal literal, panicking on malformed input. Reserved for
/// compile-time-known constants and test fixtures.
#[track_caller]
pub fn dec(literal: &str) -> Decimal {
    literal
        .parse()
        .unwrap_or_else(|err| panic!("invalid decimal literal {literal:?}: {err}"))
}

pub trait DecimalExt {
    /// Rounds towards negative infinity at the given number of fractional
    /// digits.
    fn round_floor(&self, scale: i64) -> Decimal;

    /// Raises the value to a non-negative integer power.
    fn pow_uint(&self, exp: u64) -> Decimal;

    /// Whether the value has no fractional part once trailing zeros are
    /// stripped.
    fn is_integer(&self) -> bool;
}

impl DecimalExt for Decimal {
    fn round_floor(&self, scale: i64) -> Decimal {
        self.with_scale_round(scale, RoundingMode::Floor)
    }

    fn pow_uint(&self, mut exp: u64) -> Decimal {
        let mut base = self.clone();
        let mut acc = Decimal::one();
        while exp > 0 {
            if exp & 1 == 1 {
                acc = &acc * &base;
            }
            exp >>= 1;
            if exp > 0 {
                base = &base * &base;
            }
        }
        acc
    }

    fn is_integer(&self) -> bool {
        self.with_scale_round(0, RoundingMode::Floor) == *self
    }
}
