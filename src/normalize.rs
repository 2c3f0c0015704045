//! Turns raw snapshot rows into `TransactionRecord`s.
//!
//! A row that cannot be normalized fails with a `RowError`. `Normalizer::normalize_all` reports such
//! rows to the `Observer` and carries on with the rest of the batch, so a single bad row never
//! aborts a run.

use crate::db::RawRow;
use crate::model::{Amount, AmountError, CategoryMap, TransactionRecord};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use tracing::warn;

/// Why a single row could not be normalized.
#[derive(Debug)]
pub enum RowError {
    MissingId,
    MissingAmount,
    InvalidAmount(AmountError),
    MissingTimestamp,
    InvalidTimestamp(String),
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::MissingId => write!(f, "The row has no id"),
            RowError::MissingAmount => write!(f, "The row has no amount"),
            RowError::InvalidAmount(e) => write!(f, "The row has an invalid amount: {e}"),
            RowError::MissingTimestamp => write!(f, "The row has no creation timestamp"),
            RowError::InvalidTimestamp(s) => {
                write!(f, "The row has an invalid creation timestamp '{s}'")
            }
        }
    }
}

impl Error for RowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RowError::InvalidAmount(e) => Some(e),
            _ => None,
        }
    }
}

/// Receives the observations made while normalizing rows.
pub trait Observer {
    /// `key` did not resolve to a category and `fallback` was used instead.
    fn unrecognized_category(&self, row: &RawRow, key: Option<&str>, fallback: &str);

    /// `row` was dropped from the batch.
    fn row_skipped(&self, row: &RawRow, error: &RowError);
}

/// Reports observations as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn unrecognized_category(&self, row: &RawRow, key: Option<&str>, fallback: &str) {
        warn!(
            "Unrecognized category {:?} for transaction {:?}, using '{fallback}'",
            key,
            row.id.as_deref().unwrap_or_default()
        );
    }

    fn row_skipped(&self, row: &RawRow, error: &RowError) {
        warn!("Skipping row {row:?}: {error}");
    }
}

/// The outcome of normalizing a batch.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Normalized {
    pub records: Vec<TransactionRecord>,
    pub skipped: usize,
}

/// Normalizes rows using an immutable category map and timezone.
pub struct Normalizer<'a> {
    categories: &'a CategoryMap,
    timezone: Tz,
    observer: &'a dyn Observer,
}

impl<'a> Normalizer<'a> {
    pub fn new(categories: &'a CategoryMap, timezone: Tz, observer: &'a dyn Observer) -> Self {
        Self {
            categories,
            timezone,
            observer,
        }
    }

    /// Normalizes one row.
    pub fn normalize(&self, row: &RawRow) -> Result<TransactionRecord, RowError> {
        let id = non_empty(row.id.as_deref()).ok_or(RowError::MissingId)?;
        let amount = non_empty(row.amount.as_deref()).ok_or(RowError::MissingAmount)?;
        let amount = Amount::from_str(amount).map_err(RowError::InvalidAmount)?;
        let timestamp = non_empty(row.timestamp.as_deref()).ok_or(RowError::MissingTimestamp)?;
        let date = self.localize(timestamp)?;

        let key = row.category.as_deref();
        let resolved = self.categories.resolve(key);
        if resolved.is_fallback() {
            self.observer
                .unrecognized_category(row, key, resolved.label());
        }

        Ok(TransactionRecord::new(
            id,
            row.description.as_deref().unwrap_or_default(),
            amount,
            resolved.label(),
            date,
        ))
    }

    /// Normalizes every row, skipping and reporting the ones that fail.
    pub fn normalize_all(&self, rows: &[RawRow]) -> Normalized {
        let mut normalized = Normalized::default();
        for row in rows {
            match self.normalize(row) {
                Ok(record) => normalized.records.push(record),
                Err(e) => {
                    self.observer.row_skipped(row, &e);
                    normalized.skipped += 1;
                }
            }
        }
        normalized
    }

    /// Interprets `s` as UNIX seconds (integer or float) or an RFC 3339 string and returns the
    /// calendar date in the configured timezone.
    fn localize(&self, s: &str) -> Result<NaiveDate, RowError> {
        let invalid = || RowError::InvalidTimestamp(s.to_string());
        let utc: DateTime<Utc> = if let Ok(secs) = s.parse::<i64>() {
            DateTime::from_timestamp(secs, 0).ok_or_else(invalid)?
        } else if let Ok(secs) = s.parse::<f64>() {
            if !secs.is_finite() {
                return Err(invalid());
            }
            DateTime::from_timestamp(secs.floor() as i64, 0).ok_or_else(invalid)?
        } else {
            DateTime::parse_from_rfc3339(s)
                .map_err(|_| invalid())?
                .with_timezone(&Utc)
        };
        Ok(utc.with_timezone(&self.timezone).date_naive())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
