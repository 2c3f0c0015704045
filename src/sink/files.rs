//! The CSV file sink.
//!
//! An output directory holds three files:
//! - `transactions.csv`: the records written by the latest run that had any
//! - `transactions_history.csv`: every record ever written
//! - `transactions_history_previous.csv`: the history as it was before the latest write
//!
//! The backup is taken by copying, so the history file is never absent while it is rewritten.

use crate::config::Delimiter;
use crate::error::Res;
use crate::model::{header, is_header, TransactionRecord};
use crate::sink::{Sink, Written};
use crate::utils;
use anyhow::{anyhow, Context};
use std::path::PathBuf;
use tracing::{debug, info};

const CURRENT: &str = "transactions.csv";
const HISTORY: &str = "transactions_history.csv";
const BACKUP: &str = "transactions_history_previous.csv";

pub(crate) struct FileSink {
    dir: PathBuf,
    delimiter: Delimiter,
    date_format: String,
    history: Option<Vec<Vec<String>>>,
}

impl FileSink {
    pub(crate) fn new(dir: impl Into<PathBuf>, delimiter: Delimiter, date_format: &str) -> Self {
        Self {
            dir: dir.into(),
            delimiter,
            date_format: date_format.to_string(),
            history: None,
        }
    }

    pub(crate) fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT)
    }

    pub(crate) fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY)
    }

    pub(crate) fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP)
    }

    /// Reads the history file as raw rows, or nothing if it does not exist.
    async fn read_history(&self) -> Res<Vec<Vec<String>>> {
        let path = self.history_path();
        if !utils::is_file(&path).await? {
            debug!("No history at {}", path.display());
            return Ok(Vec::new());
        }
        let data = utils::read(&path).await?;
        parse_csv(&data, self.delimiter)
            .with_context(|| format!("Unable to parse the history file {}", path.display()))
    }

    /// Replaces a stale backup with a copy of the history file, if there is a history file.
    async fn rotate_backup(&self) -> Res<()> {
        let history = self.history_path();
        if !utils::is_file(&history).await? {
            return Ok(());
        }
        let backup = self.backup_path();
        if utils::is_file(&backup).await? {
            utils::remove(&backup).await?;
        }
        utils::copy(&history, &backup)
            .await
            .context("Unable to back up the history file")?;
        debug!("Backed up {} to {}", history.display(), backup.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    async fn existing(&mut self) -> Res<Vec<Vec<String>>> {
        let rows = self.read_history().await?;
        self.history = Some(rows.clone());
        Ok(rows)
    }

    async fn write(&mut self, records: &[TransactionRecord]) -> Res<Written> {
        let location = self.dir.display().to_string();
        if records.is_empty() {
            return Ok(Written { rows: 0, location });
        }
        let existing = match self.history.take() {
            Some(rows) => rows,
            None => self.read_history().await?,
        };

        let (header, existing_data) = match existing.split_first() {
            Some((first, rest)) if is_header(first.as_slice()) => (history_header(first), rest),
            _ => (header(), existing.as_slice()),
        };
        let width = header.len();
        let new_rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| {
                let mut row = r.to_row(&self.date_format);
                row.resize(width.max(row.len()), String::new());
                row
            })
            .collect();

        utils::make_dir(&self.dir).await?;
        self.rotate_backup().await?;

        let current = std::iter::once(&header).chain(new_rows.iter());
        let data = write_csv(current, self.delimiter)?;
        utils::write(self.current_path(), data).await?;

        let history = std::iter::once(&header)
            .chain(existing_data.iter())
            .chain(new_rows.iter());
        let data = write_csv(history, self.delimiter)?;
        utils::write(self.history_path(), data).await?;

        info!(
            "Wrote {} new records to {} ({} already in the history)",
            records.len(),
            location,
            existing_data.len()
        );
        Ok(Written {
            rows: records.len(),
            location,
        })
    }
}

/// Uses the history's own header, extended to the canonical columns if it is shorter. A `who`
/// column is therefore only present if the history already has one.
fn history_header(existing: &[String]) -> Vec<String> {
    let mut header: Vec<String> = existing.to_vec();
    let canonical = crate::model::header();
    if header.len() < canonical.len() {
        header.extend_from_slice(&canonical[header.len()..]);
    }
    header
}

fn parse_csv(data: &str, delimiter: Delimiter) -> Res<Vec<Vec<String>>> {
    let data = data.strip_prefix('\u{feff}').unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.byte())
        .from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn write_csv<'a>(
    rows: impl Iterator<Item = &'a Vec<String>>,
    delimiter: Delimiter,
) -> Res<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter.byte())
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Unable to finish writing CSV data: {}", e.error()))
}

/// Reads the records of a CSV file written by this sink.
#[cfg(test)]
pub(crate) async fn read_records(
    path: &std::path::Path,
    delimiter: Delimiter,
    date_format: &str,
) -> Res<Vec<TransactionRecord>> {
    let data = utils::read(path).await?;
    parse_csv(&data, delimiter)?
        .iter()
        .filter(|row| !is_header(row.as_slice()))
        .map(|row| TransactionRecord::from_row(row.as_slice(), date_format))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use chrono::NaiveDate;
    use std::path::Path;
    use std::str::FromStr;
    use tempfile::TempDir;

    const ISO: &str = "%Y-%m-%d";

    fn record(id: &str, description: &str) -> TransactionRecord {
        TransactionRecord::new(
            id,
            description,
            Amount::from_str("-12.3").unwrap(),
            "transport",
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        )
    }

    async fn read(path: impl AsRef<Path>) -> String {
        utils::read(path.as_ref()).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_write_creates_current_and_history() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");
        let mut sink = FileSink::new(&out, Delimiter::Tab, ISO);
        assert!(sink.existing().await.unwrap().is_empty());

        let written = sink.write(&[record("1", "Bilet")]).await.unwrap();
        assert_eq!(written.rows, 1);

        let expected = "id\tdescription\tamount\tcategory\tdate\n1\tBilet\t-12,30\ttransport\t2025-04-01\n";
        assert_eq!(read(sink.current_path()).await, expected);
        assert_eq!(read(sink.history_path()).await, expected);
        assert!(!sink.backup_path().exists());
    }

    #[tokio::test]
    async fn test_second_write_rotates_backup_and_appends() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Semicolon, ISO);
        sink.write(&[record("1", "a")]).await.unwrap();
        let first_history = read(sink.history_path()).await;

        let mut sink = FileSink::new(dir.path(), Delimiter::Semicolon, ISO);
        sink.existing().await.unwrap();
        sink.write(&[record("2", "b"), record("3", "c")]).await.unwrap();

        assert_eq!(read(sink.backup_path()).await, first_history);
        let current = read_records(&sink.current_path(), Delimiter::Semicolon, ISO)
            .await
            .unwrap();
        assert_eq!(current, vec![record("2", "b"), record("3", "c")]);
        let history = read_records(&sink.history_path(), Delimiter::Semicolon, ISO)
            .await
            .unwrap();
        assert_eq!(
            history,
            vec![record("1", "a"), record("2", "b"), record("3", "c")]
        );
    }

    #[tokio::test]
    async fn test_stale_backup_is_replaced_not_accumulated() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        sink.write(&[record("1", "a")]).await.unwrap();
        sink.write(&[record("2", "b")]).await.unwrap();
        let second_history = read(sink.history_path()).await;
        sink.write(&[record("3", "c")]).await.unwrap();

        assert_eq!(read(sink.backup_path()).await, second_history);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        sink.write(&[record("1", "a")]).await.unwrap();
        sink.write(&[record("2", "b")]).await.unwrap();
        let before = (
            read(sink.current_path()).await,
            read(sink.history_path()).await,
            read(sink.backup_path()).await,
        );

        let written = sink.write(&[]).await.unwrap();
        assert_eq!(written.rows, 0);
        let after = (
            read(sink.current_path()).await,
            read(sink.history_path()).await,
            read(sink.backup_path()).await,
        );
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_existing_history_text_is_preserved() {
        let dir = TempDir::new().unwrap();
        let history = "id\tdescription\tamount\tcategory\tdate\twho\n\
                       m1\tObiad\t-40,00\tinne\t2025-03-30\tOla\n";
        utils::write(dir.path().join(HISTORY), history).await.unwrap();

        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        let existing = sink.existing().await.unwrap();
        assert_eq!(existing.len(), 2);
        sink.write(&[record("1", "Bilet")]).await.unwrap();

        let expected = format!("{history}1\tBilet\t-12,30\ttransport\t2025-04-01\t\n");
        assert_eq!(read(sink.history_path()).await, expected);
        let records = read_records(&sink.history_path(), Delimiter::Tab, ISO)
            .await
            .unwrap();
        assert_eq!(records[0].who(), Some("Ola"));
        assert_eq!(records[1].who(), None);
    }

    #[tokio::test]
    async fn test_fields_with_delimiter_are_quoted() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Semicolon, ISO);
        sink.write(&[record("1", "Kawa; ciastko")]).await.unwrap();
        let text = read(sink.current_path()).await;
        assert!(text.contains("\"Kawa; ciastko\""));

        let records = read_records(&sink.current_path(), Delimiter::Semicolon, ISO)
            .await
            .unwrap();
        assert_eq!(records[0].description(), "Kawa; ciastko");
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_history() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        sink.write(&[record("1", "Bilet")]).await.unwrap();
        let before = read(sink.history_path()).await;

        std::fs::remove_file(sink.current_path()).unwrap();
        std::fs::create_dir(sink.current_path()).unwrap();

        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        sink.existing().await.unwrap();
        assert!(sink.write(&[record("2", "Paliwo")]).await.is_err());
        assert_eq!(read(sink.history_path()).await, before);
        assert_eq!(read(sink.backup_path()).await, before);
    }

    #[tokio::test]
    async fn test_history_with_byte_order_mark() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), Delimiter::Tab, ISO);
        utils::write(
            sink.history_path(),
            "\u{feff}id\tdescription\tamount\tcategory\tdate\n1\tBilet\t-12,30\ttransport\t2025-04-01\n",
        )
        .await
        .unwrap();

        let existing = sink.existing().await.unwrap();
        assert_eq!(existing.len(), 2);
        assert!(is_header(existing[0].as_slice()));

        sink.write(&[record("2", "Paliwo")]).await.unwrap();
        let history = read(sink.history_path()).await;
        assert_eq!(history.matches("description").count(), 1);
        let ids: Vec<String> = read_records(&sink.history_path(), Delimiter::Tab, ISO)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
