//! The append-only spreadsheet sink.

use crate::api::Sheet;
use crate::error::Res;
use crate::model::{A1Range, TransactionRecord};
use crate::sink::{Sink, Written};
use anyhow::Context;
use std::time::Duration;
use tracing::{info, warn};

const BACKOFF: Duration = Duration::from_millis(500);

/// Appends records below the populated rows of a range. Existing cells are never cleared or
/// rewritten.
pub(crate) struct SheetSink {
    sheet: Box<dyn Sheet + Send>,
    range: A1Range,
    target_row: Option<u32>,
    attempts: u32,
    backoff: Duration,
    date_format: String,
    existing_rows: Option<usize>,
}

impl SheetSink {
    pub(crate) fn new(
        sheet: Box<dyn Sheet + Send>,
        range: A1Range,
        target_row: Option<u32>,
        attempts: u32,
        date_format: &str,
    ) -> Self {
        Self {
            sheet,
            range,
            target_row,
            attempts: attempts.max(1),
            backoff: BACKOFF,
            date_format: date_format.to_string(),
            existing_rows: None,
        }
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn read_with_retry(&mut self, range: &str) -> Res<Vec<Vec<String>>> {
        let mut attempt = 1;
        loop {
            let result = self.sheet.read(range).await;
            match result {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt < self.attempts => {
                    pause(attempt, self.attempts, self.backoff, &e).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn append_with_retry(&mut self, rows: &[Vec<String>], range: &str) -> Res<()> {
        let mut attempt = 1;
        loop {
            let result = self.sheet.append(rows, range).await;
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    pause(attempt, self.attempts, self.backoff, &e).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The first row to write to: the configured target row, or the row after the populated rows
    /// of the range.
    async fn first_empty_row(&mut self) -> Res<u32> {
        if let Some(row) = self.target_row {
            return Ok(row);
        }
        let existing = match self.existing_rows {
            Some(n) => n,
            None => self.existing().await?.len(),
        };
        let existing = u32::try_from(existing).context("The sheet has too many rows")?;
        self.range
            .start_row()
            .checked_add(existing)
            .context("The sheet has too many rows")
    }
}

/// Sleeps before retry number `attempt`, a little longer each time.
async fn pause(attempt: u32, attempts: u32, backoff: Duration, error: &anyhow::Error) {
    warn!("Spreadsheet call failed (attempt {attempt} of {attempts}): {error:#}");
    tokio::time::sleep(backoff * attempt).await;
}

#[async_trait::async_trait]
impl Sink for SheetSink {
    async fn existing(&mut self) -> Res<Vec<Vec<String>>> {
        let range = self.range.to_string();
        let rows = self
            .read_with_retry(&range)
            .await
            .with_context(|| format!("Unable to read the existing rows of {range}"))?;
        self.existing_rows = Some(rows.len());
        Ok(rows)
    }

    async fn write(&mut self, records: &[TransactionRecord]) -> Res<Written> {
        if records.is_empty() {
            return Ok(Written {
                rows: 0,
                location: self.range.to_string(),
            });
        }
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| r.to_row(&self.date_format))
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or_default();
        let first_row = self.first_empty_row().await?;
        let count = u32::try_from(rows.len()).context("Too many rows to append")?;
        let width = u32::try_from(width).context("Too many columns to append")?;
        let target = self.range.rows(first_row, count, width)?.to_string();

        self.append_with_retry(&rows, &target)
            .await
            .with_context(|| format!("Unable to append rows to {target}"))?;
        self.existing_rows = self.existing_rows.map(|n| n + rows.len());
        info!("Appended {} new records to {target}", rows.len());
        Ok(Written {
            rows: rows.len(),
            location: target,
        })
    }
}
