//! Menu price using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is empty.
    #[error("price is required")]
    Empty,
    /// The input is not digits with an optional one- or two-digit fraction.
    #[error("price must look like 450 or 450.00")]
    Format,
    /// The amount is zero.
    #[error("price must be greater than 0")]
    NotPositive,
}

/// A positive menu price in the restaurant's local currency.
///
/// Parsed from form input of the shape `^\d+(\.\d{1,2})?$`; stored as a
/// number in the profile store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Parse a price from form input.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError`] when the input is empty, malformed or zero.
    pub fn parse(input: &str) -> Result<Self, PriceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PriceError::Empty);
        }

        let (whole, fraction) = match input.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (input, None),
        };
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(whole) || fraction.is_some_and(|f| !digits(f) || f.len() > 2) {
            return Err(PriceError::Format);
        }

        let amount: Decimal = input.parse().map_err(|_| PriceError::Format)?;
        if amount <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        Ok(Self(amount))
    }

    /// Build a price from a stored floating-point number.
    ///
    /// Returns `None` for non-finite or non-positive values.
    #[must_use]
    pub fn from_stored(value: f64) -> Option<Self> {
        let amount = Decimal::from_f64_retain(value)?.round_dp(2);
        (amount > Decimal::ZERO).then_some(Self(amount))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount as a float, for the profile store's number type.
    #[must_use]
    pub fn to_stored(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Price::parse("450").unwrap().to_string(), "450.00");
        assert_eq!(Price::parse("450.5").unwrap().to_string(), "450.50");
        assert_eq!(Price::parse(" 99.99 ").unwrap().to_string(), "99.99");
    }

    #[test]
    fn test_parse_rejects_bad_format() {
        assert_eq!(Price::parse(""), Err(PriceError::Empty));
        assert_eq!(Price::parse("4,50"), Err(PriceError::Format));
        assert_eq!(Price::parse("450.123"), Err(PriceError::Format));
        assert_eq!(Price::parse(".50"), Err(PriceError::Format));
        assert_eq!(Price::parse("450."), Err(PriceError::Format));
        assert_eq!(Price::parse("-3"), Err(PriceError::Format));
    }

    #[test]
    fn test_parse_rejects_zero() {
        assert_eq!(Price::parse("0"), Err(PriceError::NotPositive));
        assert_eq!(Price::parse("0.00"), Err(PriceError::NotPositive));
    }

    #[test]
    fn test_stored_roundtrip_keeps_cents() {
        let price = Price::parse("125.75").unwrap();
        let restored = Price::from_stored(price.to_stored()).unwrap();
        assert_eq!(restored, price);
        assert_eq!(Price::from_stored(0.0), None);
    }
}
