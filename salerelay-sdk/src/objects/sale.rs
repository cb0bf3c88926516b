//! The sale notification relayed from producer to subscribers.

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::Date;

/// A currency-agnostic, non-negative sale amount.
///
/// Stored as a normalized [`Decimal`] (trailing zeros stripped) and encoded
/// as a JSON number: integral amounts that fit in a `u64` without a
/// fractional part (`250`), everything else in its shortest float form
/// (`250.5`). The latter are limited to [`MAX_SIGNIFICANT_DIGITS`] so the
/// float encoding is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

/// Most significant digits a float-encoded amount may carry.
pub const MAX_SIGNIFICANT_DIGITS: u32 = 15;

/// Reasons an amount can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is not a decimal number")]
    NotANumber,
    #[error("amount must not be negative")]
    Negative,
    #[error("amount has more than 15 significant digits")]
    TooPrecise,
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        let value = value.normalize();
        if integral_u64(value).is_none() && significant_digits(value) > MAX_SIGNIFICANT_DIGITS {
            return Err(AmountError::TooPrecise);
        }
        Ok(Self(value))
    }

    /// Convert through the float's shortest decimal form, so `0.1` stays `0.1`.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotANumber);
        }
        value.to_string().parse()
    }

    /// The underlying decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = Decimal::from_str_exact(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|_| AmountError::NotANumber)?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn integral_u64(value: Decimal) -> Option<u64> {
    if value.scale() == 0 { value.to_u64() } else { None }
}

fn significant_digits(value: Decimal) -> u32 {
    value
        .mantissa()
        .unsigned_abs()
        .checked_ilog10()
        .map_or(1, |log| log + 1)
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(whole) = integral_u64(self.0) {
            return serializer.serialize_u64(whole);
        }
        match self.0.to_f64() {
            Some(value) => serializer.serialize_f64(value),
            None => Err(serde::ser::Error::custom("amount out of range")),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal number")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        Amount::from_f64(v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }
}

/// A single sale notification.
///
/// The encoded form is the JSON object `{"amount":…,"date":…,"time":…}`,
/// which is exactly what subscribers receive as a text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleEvent {
    /// Sale amount.
    pub amount: Amount,
    /// Calendar date of the sale, encoded as `YYYY-MM-DD`.
    pub date: Date,
    /// Time of day as reported by the producer (ISO-8601 or a locale string).
    pub time: CompactString,
}

impl SaleEvent {
    /// Encode to the JSON text frame sent to subscribers.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a frame received from the relay.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn integral_amount_encodes_without_fraction() {
        let amount: Amount = "250.00".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "250");
    }

    #[test]
    fn fractional_amount_keeps_shortest_form() {
        let amount: Amount = "99.50".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "99.5");
    }

    #[test]
    fn negative_amount_is_rejected() {
        assert_eq!("-1".parse::<Amount>(), Err(AmountError::Negative));
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }

    #[test]
    fn negative_zero_is_accepted() {
        let amount: Amount = "-0".parse().unwrap();
        assert!(amount.value().is_zero());
    }

    #[test]
    fn fifteen_significant_digits_encode_exactly() {
        let amount: Amount = "1234567.12345678".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "1234567.12345678");
        let amount: Amount = "0.123456789012345".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "0.123456789012345");
    }

    #[test]
    fn overly_precise_amount_is_rejected() {
        assert_eq!(
            "1234567.123456789123".parse::<Amount>(),
            Err(AmountError::TooPrecise)
        );
        assert_eq!(
            "0.12345678901234567891".parse::<Amount>(),
            Err(AmountError::TooPrecise)
        );
        // Trailing zeros do not count.
        assert!("12.500000000000000000".parse::<Amount>().is_ok());
    }

    #[test]
    fn large_integral_amount_stays_exact() {
        let amount: Amount = "18446744073709551615".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "18446744073709551615");
    }

    #[test]
    fn float_amount_keeps_its_shortest_form() {
        assert_eq!(Amount::from_f64(0.1).unwrap(), "0.1".parse().unwrap());
        assert_eq!(Amount::from_f64(f64::NAN), Err(AmountError::NotANumber));
        let decoded: Amount = serde_json::from_str("12.5").unwrap();
        assert_eq!(serde_json::to_string(&decoded).unwrap(), "12.5");
    }

    #[test]
    fn garbage_amount_is_not_a_number() {
        assert_eq!("12abc".parse::<Amount>(), Err(AmountError::NotANumber));
    }

    #[test]
    fn amount_accepts_numeric_strings() {
        let amount: Amount = serde_json::from_str("\"42.10\"").unwrap();
        assert_eq!(amount, "42.1".parse().unwrap());
    }

    #[test]
    fn encodes_in_field_order() {
        let event = SaleEvent {
            amount: "250".parse().unwrap(),
            date: Date::from_calendar_date(2024, Month::June, 1).unwrap(),
            time: "14:30".into(),
        };
        assert_eq!(
            event.encode().unwrap(),
            r#"{"amount":250,"date":"2024-06-01","time":"14:30"}"#
        );
    }

    #[test]
    fn decodes_reference_frame() {
        let event =
            SaleEvent::decode(br#"{"amount":100,"date":"2024-01-01","time":"10:00"}"#).unwrap();
        assert_eq!(event.amount, "100".parse().unwrap());
        assert_eq!(
            event.date,
            Date::from_calendar_date(2024, Month::January, 1).unwrap()
        );
        assert_eq!(event.time, "10:00");
    }

    #[test]
    fn decode_rejects_missing_field() {
        assert!(SaleEvent::decode(br#"{"amount":1,"date":"2024-01-01"}"#).is_err());
    }
}
