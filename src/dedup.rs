//! Filters out records that a destination already holds.

use crate::model::{is_header, TransactionRecord, ValueKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// How records are compared with the ones already in a destination.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dedup {
    /// A record is known if its id is known.
    #[default]
    Id,
    /// A record is known if a row with the same description, amount, category and date is known.
    /// Ids are ignored.
    FullValue,
}

serde_plain::derive_display_from_serialize!(Dedup);
serde_plain::derive_fromstr_from_deserialize!(Dedup);

/// The keys of the records already in a destination, under one `Dedup` strategy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Existing {
    strategy: Dedup,
    ids: HashSet<String>,
    values: HashSet<ValueKey>,
}

impl Existing {
    /// An empty destination.
    pub fn empty(strategy: Dedup) -> Self {
        Self {
            strategy,
            ids: HashSet::new(),
            values: HashSet::new(),
        }
    }

    /// Collects the keys of `rows`, which are in canonical column order. A header row is skipped.
    /// Under `Dedup::FullValue`, rows that cannot be parsed are ignored.
    pub fn from_rows<R, S>(strategy: Dedup, rows: &[R], date_format: &str) -> Self
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut existing = Self::empty(strategy);
        for row in rows {
            let row: &[S] = row.as_ref();
            if is_header(row) {
                continue;
            }
            match strategy {
                Dedup::Id => {
                    if let Some(id) = row.first().map(|s| s.as_ref().trim()) {
                        if !id.is_empty() {
                            existing.ids.insert(id.to_string());
                        }
                    }
                }
                Dedup::FullValue => match TransactionRecord::from_row(row, date_format) {
                    Ok(record) => {
                        existing.values.insert(record.value_key());
                    }
                    Err(e) => debug!("Ignoring an existing row that cannot be compared: {e:#}"),
                },
            }
        }
        existing
    }

    pub fn strategy(&self) -> Dedup {
        self.strategy
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        match self.strategy {
            Dedup::Id => self.ids.len(),
            Dedup::FullValue => self.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, record: &TransactionRecord) -> bool {
        match self.strategy {
            Dedup::Id => self.ids.contains(record.id()),
            Dedup::FullValue => self.values.contains(&record.value_key()),
        }
    }

    /// Returns the records of `batch` that are not known, in their original order. A record whose
    /// id already appeared earlier in `batch` is dropped with a warning.
    pub fn filter(&self, batch: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
        let mut seen = HashSet::new();
        batch
            .into_iter()
            .filter(|record| {
                if !seen.insert(record.id().to_string()) {
                    warn!(
                        "Transaction id '{}' appears more than once in the batch, keeping the first",
                        record.id()
                    );
                    return false;
                }
                !self.contains(record)
            })
            .collect()
    }
}
