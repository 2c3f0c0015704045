//! cashew-export: exports new transactions from the latest Cashew SQLite snapshot into CSV files
//! or a Google sheet, skipping the ones that were exported before.

mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod dedup;
mod error;
pub mod model;
mod normalize;
mod sink;
mod snapshot;
mod utils;

pub use api::Mode;
pub use config::{Config, Delimiter, SheetConfig, SinkKind};
pub use dedup::Dedup;
pub use error::{Error, ErrorType, Result};
pub use snapshot::{SnapshotFile, SnapshotPattern};
