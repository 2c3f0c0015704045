//! These structs provide the CLI interface for cashew-export.

use crate::commands::ExportRequest;
use crate::config::SinkKind;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

const DB_DIRS: [&str; 2] = ["db", "workdir/db"];
const OUTPUT_DIR: &str = "output";

/// cashew-export: exports new transactions from the latest Cashew database snapshot.
///
/// The newest `cashew-*.sql` snapshot in the database directory is read, transactions created
/// after the configured cutoff date are normalized, and the ones that are not already in the
/// destination are written. The destination is either a set of CSV files in the output directory
/// (transactions.csv, transactions_history.csv and transactions_history_previous.csv) or a range of
/// a Google sheet.
///
/// Running it again without new transactions in the snapshot changes nothing.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct Args {
    /// The directory holding the snapshots. Defaults to ./db, then ./workdir/db, then the current
    /// directory.
    db_dir: Option<PathBuf>,

    /// The directory for the CSV files. Defaults to ./output if it exists, otherwise the current
    /// directory. If this names a file, its directory is used.
    output_dir: Option<PathBuf>,

    /// The configuration file. Defaults to config.json in the cashew-export directory of your
    /// platform's config directory, when it exists.
    #[arg(long, env = "CASHEW_EXPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Where to write new transactions. Overrides the configuration file.
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,

    /// Find the new transactions but do not write them.
    #[arg(long)]
    dry_run: bool,

    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn sink(&self) -> Option<SinkKind> {
        self.sink
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Resolves the directories against `cwd` into an `ExportRequest`.
    pub fn request(&self, cwd: &Path) -> ExportRequest {
        ExportRequest {
            db_dir: resolve_db_dir(self.db_dir.as_deref(), cwd),
            output_dir: resolve_output_dir(self.output_dir.as_deref(), cwd),
            dry_run: self.dry_run,
        }
    }
}

/// Returns `arg` if given, else the first of the conventional snapshot directories that exists,
/// else `cwd`.
fn resolve_db_dir(arg: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(dir) = arg {
        return cwd.join(dir);
    }
    DB_DIRS
        .iter()
        .map(|d| cwd.join(d))
        .find(|d| d.is_dir())
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// Returns `arg` (or its parent directory if it is a file) if given, else `./output` if it exists,
/// else `cwd`.
fn resolve_output_dir(arg: Option<&Path>, cwd: &Path) -> PathBuf {
    match arg {
        Some(path) => {
            let path = cwd.join(path);
            if path.is_file() {
                path.parent().map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            }
        }
        None => {
            let output = cwd.join(OUTPUT_DIR);
            if output.is_dir() {
                output
            } else {
                cwd.to_path_buf()
            }
        }
    }
}
