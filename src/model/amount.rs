//! Amount type for handling monetary values written with a comma decimal separator.
//!
//! This module provides the `Amount` type which wraps `Decimal`. It parses the many shapes an
//! amount arrives in (`12.5` from SQLite, `12,50` from an exported CSV, `1 234,50` typed into a
//! spreadsheet) and always displays as `-1234,50`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The number of decimal places used when displaying an amount.
const DISPLAY_DP: u32 = 2;

/// Represents a monetary amount.
///
/// Equality, ordering and hashing are those of the underlying `Decimal`, so `12,5` and `12,50`
/// are the same amount. The displayed string is for output only and is never compared.
///
/// # Examples
///
/// ```
/// # use cashew_export::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-1234.5").unwrap();
/// assert_eq!(amount.to_string(), "-1234,50");
/// ```
///
/// ```
/// # use cashew_export::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("1 234,50").unwrap();
/// let b = Amount::from_str("1234.5").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value.is_sign_negative()
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError {
    input: String,
    source: Option<rust_decimal::Error>,
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmountError")
            .field("input", &self.input)
            .field("source", &self.source)
            .finish()
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(e) => write!(f, "Invalid amount '{}': {e}", self.input),
            None => write!(f, "Invalid amount '{}'", self.input),
        }
    }
}

impl Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn Error + 'static))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |source| AmountError {
            input: s.to_string(),
            source,
        };

        // Grouping spaces, including the non-breaking ones spreadsheets like to insert
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
            .collect();
        if compact.is_empty() {
            return Err(err(None));
        }

        // With both separators present the last one is the decimal separator and the other groups
        // thousands. A lone comma is the decimal separator.
        let normalized = match (compact.rfind('.'), compact.rfind(',')) {
            (Some(dot), Some(comma)) if comma > dot => compact.replace('.', "").replace(',', "."),
            (Some(_), Some(_)) => compact.replace(',', ""),
            _ => compact.replace(',', "."),
        };

        let value = match Decimal::from_str(&normalized) {
            Ok(value) => value,
            Err(e) => Decimal::from_scientific(&normalized).map_err(|_| err(Some(e)))?,
        };
        Ok(Amount { value })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rounded = self
            .value
            .round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero);
        // Avoid printing "-0,00"
        let rounded = if rounded.is_zero() {
            Decimal::ZERO
        } else {
            rounded
        };
        let s = format!("{rounded:.2}");
        write!(f, "{}", s.replace('.', ","))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
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
