//! Loyalty-credit amounts.
//!
//! Every amount in the ledger is a whole number of cents. Lots, links and
//! running balances all add and subtract `Money`, so the draw-down of a lot
//! is exact and two runs over the same input agree to the cent.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A credit amount held at cent precision.
///
/// Input amounts are bounded by [`Money::LIMIT`] so that summing every
/// amount of a run stays far inside the range of the underlying decimal.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use fifo_ledger::Money;
///
/// let amount = Money::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.50");
/// assert!(Money::parse_exact("0.004").is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    /// Cents per unit, as a decimal scale.
    pub const SCALE: u32 = 2;

    /// Largest accepted magnitude of a single input amount, in whole units.
    pub const LIMIT: i64 = 1_000_000_000_000_000;

    pub const ZERO: Self = Money(Decimal::ZERO);

    /// Wraps a decimal, rounding it to whole cents.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Money(normalized)
    }

    /// Creates a value from an integer number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, Self::SCALE))
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this value is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns `true` if this value is strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Underlying decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the magnitude is within [`Money::LIMIT`].
    pub fn is_within_limit(&self) -> bool {
        within_limit(self.0)
    }

    /// Parses an amount that is already a whole number of cents and within
    /// [`Money::LIMIT`]. Returns `None` instead of rounding.
    pub fn parse_exact(s: &str) -> Option<Self> {
        let value = Decimal::from_str(s.trim()).ok()?;
        if value.normalize().scale() > Self::SCALE || !within_limit(value) {
            return None;
        }
        Some(Money::new(value))
    }
}

fn within_limit(value: Decimal) -> bool {
    value.abs() <= Decimal::from(Money::LIMIT)
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)?;
        Ok(Money::new(decimal))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:.2}", self.0))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}
