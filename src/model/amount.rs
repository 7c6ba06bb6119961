//! Amount type for handling currency values without floating point drift.
//!
//! This module provides the `Amount` type which wraps `Decimal`. Amounts travel over the wire as
//! JSON numbers, are stored as decimal text, and are only rounded to two places when displayed.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

/// Represents a currency amount at full precision.
///
/// # Examples
///
/// Parsing keeps every digit:
/// ```
/// # use money_monitor::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("150.505").unwrap();
/// assert_eq!(amount.value().to_string(), "150.505");
/// ```
///
/// Display rounds to two places and adds thousands separators:
/// ```
/// # use money_monitor::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("1234.5").unwrap();
/// assert_eq!(amount.to_string(), "1,234.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.0.is_zero() && self.0.is_sign_negative()
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Thousands separators are accepted on input but never kept
        let cleaned = s.trim().replace(',', "");
        Decimal::from_str(&cleaned).map(Amount).map_err(AmountError)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (sign, num) = if self.is_negative() {
            ("-", self.0.abs())
        } else {
            ("", self.0)
        };
        let rounded = num
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or_default();
        write!(f, "{sign}{}", format_num::format_num!(",.2", rounded))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.0.to_f64().unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Amount(Decimal::from(v)))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Amount(Decimal::from(v)))
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
        // The shortest round-trip representation of the float is what the sender typed, e.g.
        // 150.5 rather than 150.5000000000000000001
        Amount::from_str(&v.to_string()).map_err(E::custom)
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Amount::from_str(v).map_err(E::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

/// Arithmetic on amounts never panics. A result outside the range of `Decimal` is clamped to
/// `Decimal::MAX` or `Decimal::MIN`.
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        clamp(self.0.checked_add(rhs.0), rhs.0.is_sign_positive())
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        clamp(self.0.checked_sub(rhs.0), rhs.0.is_sign_negative())
    }
}

fn clamp(result: Option<Decimal>, upwards: bool) -> Amount {
    match result {
        Some(value) => Amount(value),
        None if upwards => Amount(Decimal::MAX),
        None => Amount(Decimal::MIN),
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_plain() {
        let amount = Amount::from_str("50.00").unwrap();
        assert_eq!(amount.value(), dec!(50.00));
    }

    #[test]
    fn test_parse_with_commas_and_whitespace() {
        let amount = Amount::from_str("  1,234,567.89 ").unwrap();
        assert_eq!(amount.value(), dec!(1234567.89));
    }

    #[test]
    fn test_sum_past_decimal_range_is_clamped() {
        let max = Amount::new(Decimal::MAX);
        assert_eq!(max + max, max);
        let mut total = Amount::ZERO;
        total += max;
        total += Amount::new(dec!(1));
        assert_eq!(total, max);
        let min = Amount::new(Decimal::MIN);
        assert_eq!(min - max, min);
        assert_eq!(min + Amount::new(dec!(-1)), min);
        assert_eq!(max - Amount::new(dec!(1)), Amount::new(Decimal::MAX - dec!(1)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Amount::from_str("fifty").is_err());
    }

    #[test]
    fn test_display_rounds_to_two_places() {
        assert_eq!(Amount::new(dec!(150.505)).to_string(), "150.51");
        assert_eq!(Amount::new(dec!(0)).to_string(), "0.00");
        assert_eq!(Amount::new(dec!(-60000)).to_string(), "-60,000.00");
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&Amount::new(dec!(150.50))).unwrap();
        assert_eq!(json, "150.5");
    }

    #[test]
    fn test_deserialize_number() {
        let amount: Amount = serde_json::from_str("150.5").unwrap();
        assert_eq!(amount.value(), dec!(150.5));
        let amount: Amount = serde_json::from_str("100").unwrap();
        assert_eq!(amount.value(), dec!(100));
    }

    #[test]
    fn test_deserialize_string() {
        let amount: Amount = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(amount.value(), dec!(0.10));
    }

    #[test]
    fn test_sum_is_exact() {
        // 0.1 + 0.2 is the classic float failure
        let total: Amount = [dec!(0.1), dec!(0.2)].into_iter().map(Amount::new).sum();
        assert_eq!(total.value(), dec!(0.3));
    }

    #[test]
    fn test_is_negative() {
        assert!(Amount::new(dec!(-1)).is_negative());
        assert!(!Amount::ZERO.is_negative());
        assert!(!Amount::new(dec!(1)).is_negative());
    }
}
