//! # Money
//!
//! Amounts are integer minor units (paise, cents). Floats are never accepted:
//! a price sheet that round-trips through JSON must produce the same
//! integers it was built from.

use serde::{Deserialize, Serialize};

use crate::error::{MessError, ValidationErrors};

/// A non-negative amount in minor currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Create a validated amount.
    pub fn new(minor_units: i64) -> Result<Self, MessError> {
        if minor_units < 0 {
            return Err(MessError::invalid_field("amount", "must not be negative"));
        }
        Ok(Self(minor_units))
    }

    /// Validate `value` as the field `field`, recording a violation in
    /// `errors` instead of failing fast.
    pub fn checked(field: &str, value: i64, errors: &mut ValidationErrors) -> Money {
        if value < 0 {
            errors.push(field, "must not be negative");
            Money::ZERO
        } else {
            Money(value)
        }
    }

    /// Minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Money {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            Err(format!("amount must not be negative, got {value}"))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Money> for i64 {
    fn from(m: Money) -> Self {
        m.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A price that differs between vegetarian and non-vegetarian servings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegPrice {
    pub veg: Money,
    pub non_veg: Money,
}

impl VegPrice {
    /// Validate both halves, reporting each as `{field}.veg` / `{field}.nonVeg`.
    pub fn checked(field: &str, veg: i64, non_veg: i64, errors: &mut ValidationErrors) -> Self {
        Self {
            veg: Money::checked(&format!("{field}.veg"), veg, errors),
            non_veg: Money::checked(&format!("{field}.nonVeg"), non_veg, errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_amount_rejected() {
        assert!(Money::new(-1).is_err());
        assert_eq!(Money::new(4500).unwrap().minor_units(), 4500);
    }

    #[test]
    fn deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Money>("-5").is_err());
        assert_eq!(serde_json::from_str::<Money>("5").unwrap(), Money::new(5).unwrap());
    }

    #[test]
    fn deserialize_rejects_float() {
        assert!(serde_json::from_str::<Money>("12.5").is_err());
    }

    #[test]
    fn checked_collects_every_field() {
        let mut errors = ValidationErrors::new();
        let price = VegPrice::checked("lunchPrice", -1, -2, &mut errors);
        assert_eq!(price, VegPrice::default());
        assert_eq!(errors.fields(), vec!["lunchPrice.veg", "lunchPrice.nonVeg"]);
    }

    #[test]
    fn veg_price_wire_format() {
        let price = VegPrice {
            veg: Money::new(60).unwrap(),
            non_veg: Money::new(90).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(price).unwrap(),
            serde_json::json!({"veg": 60, "nonVeg": 90})
        );
    }
}
