//! Destinations for exported records.
//!
//! A `Sink` reports the rows it already holds, which feed deduplication, and persists a batch of
//! new records. Both sinks leave their destination untouched when the batch is empty.

mod files;
mod sheet;

use crate::api::{self, Mode};
use crate::config::{Config, SinkKind};
use crate::error::Res;
use crate::model::TransactionRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) use files::FileSink;
#[cfg(test)]
pub(crate) use files::read_records;
pub(crate) use sheet::SheetSink;

/// What a `Sink::write` call did.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Written {
    /// The number of records written.
    pub rows: usize,
    /// Where they were written, a directory or an A1 range.
    pub location: String,
}

#[async_trait::async_trait]
pub(crate) trait Sink {
    /// The rows currently held by the destination, in canonical column order. A header row may be
    /// included.
    async fn existing(&mut self) -> Res<Vec<Vec<String>>>;

    /// Persists `records`. Does nothing when `records` is empty.
    async fn write(&mut self, records: &[TransactionRecord]) -> Res<Written>;
}

/// Opens the sink selected by `config`.
pub(crate) async fn open(
    config: &Config,
    output_dir: &Path,
    mode: Mode,
) -> Res<Box<dyn Sink + Send>> {
    match config.sink() {
        SinkKind::File => Ok(Box::new(FileSink::new(
            output_dir,
            config.delimiter(),
            config.date_format(),
        ))),
        SinkKind::Sheet => {
            let sheet_config = config.sheet();
            let sheet = api::sheet(sheet_config, mode).await?;
            Ok(Box::new(SheetSink::new(
                sheet,
                sheet_config.range().clone(),
                sheet_config.target_row(),
                sheet_config.attempts(),
                config.date_format(),
            )))
        }
    }
}
