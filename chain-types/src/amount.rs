//! `Amount`, a range-checked quantity of the chain's base monetary unit.

use std::{convert::TryFrom, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The number of base units in one whole coin.
pub const COIN: u64 = 100_000_000;

/// The maximum amount of currency that can ever exist, in base units.
pub const MAX_MONEY: u64 = 10_000_000_000 * COIN;

/// The minimum output value considered economical to spend.
pub const DUST_THRESHOLD: u64 = 546;

/// Number of confirmations a coinbase output must accumulate before it is spendable.
pub const COINBASE_MATURITY: u32 = 100;

/// An error produced by range-checked `Amount` arithmetic.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum AmountError {
    /// A value, or the result of an operation, fell outside `[0, MAX_MONEY]`.
    #[error("amount {0} is outside the valid range [0, {MAX_MONEY}]")]
    OutOfRange(u64),
    /// An addition, subtraction, or multiplication overflowed or underflowed.
    #[error("arithmetic overflow computing an Amount")]
    Overflow,
}

/// A quantity of the chain's base monetary unit, always in `[0, MAX_MONEY]`.
///
/// All arithmetic is checked: operations that would leave the valid range
/// return `AmountError` rather than wrapping or saturating, per the overflow
/// discipline used throughout this crate (`SafeAdd`/`SafeSub`/`SafeMul` in the
/// original C++ implementation this crate's semantics are grounded on).
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Constructs an `Amount`, checking that it lies within `[0, MAX_MONEY]`.
    pub fn try_new(value: u64) -> Result<Amount, AmountError> {
        if value > MAX_MONEY {
            Err(AmountError::OutOfRange(value))
        } else {
            Ok(Amount(value))
        }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        if self.0 > MAX_MONEY - other.0 {
            return Err(AmountError::Overflow);
        }
        Amount::try_new(self.0 + other.0)
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount, AmountError> {
        if self.0 < other.0 {
            return Err(AmountError::Overflow);
        }
        Ok(Amount(self.0 - other.0))
    }

    pub fn checked_mul(self, multiplier: u64) -> Result<Amount, AmountError> {
        if self.0 == 0 || multiplier == 0 {
            return Ok(Amount::ZERO);
        }
        if self.0 > MAX_MONEY / multiplier {
            return Err(AmountError::Overflow);
        }
        Amount::try_new(self.0 * multiplier)
    }

    pub fn is_dust(self) -> bool {
        self.0 < DUST_THRESHOLD
    }
}

impl TryFrom<u64> for Amount {
    type Error = AmountError;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Amount::try_new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> u64 {
        amount.0
    }
}

impl std::fmt::Debug for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{:08} coin", self.0 / COIN, self.0 % COIN)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, x| Amount(acc.0.saturating_add(x.0)))
    }
}

impl BitcoinSerialize for Amount {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for Amount {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let value = u64::bitcoin_deserialize(reader)?;
        Amount::try_new(value).map_err(|_| SerializationError::Parse("amount out of range"))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Amount {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Amount>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (0..=MAX_MONEY).prop_map(Amount).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overflow_leaves_inputs_untouched() {
        let a = Amount::try_new(MAX_MONEY).unwrap();
        let b = Amount::try_new(1).unwrap();
        assert_eq!(a.checked_add(b), Err(AmountError::Overflow));
        assert_eq!(a.as_u64(), MAX_MONEY);
    }

    #[test]
    fn sub_underflow_errors() {
        let a = Amount::try_new(5).unwrap();
        let b = Amount::try_new(10).unwrap();
        assert_eq!(a.checked_sub(b), Err(AmountError::Overflow));
    }

    #[test]
    fn mul_overflow_errors() {
        let a = Amount::try_new(MAX_MONEY).unwrap();
        assert_eq!(a.checked_mul(2), Err(AmountError::Overflow));
    }

    #[test]
    fn mul_by_zero_is_zero() {
        let a = Amount::try_new(12345).unwrap();
        assert_eq!(a.checked_mul(0), Ok(Amount::ZERO));
    }

    #[test]
    fn out_of_range_rejected() {
        assert_eq!(
            Amount::try_new(MAX_MONEY + 1),
            Err(AmountError::OutOfRange(MAX_MONEY + 1))
        );
    }

    #[test]
    fn dust_threshold() {
        assert!(Amount::try_new(545).unwrap().is_dust());
        assert!(!Amount::try_new(546).unwrap().is_dust());
    }
}
