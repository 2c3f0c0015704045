//! Finds the newest Cashew database snapshot in a directory.
//!
//! Snapshot files are named `<prefix>...<YYYY-MM-DD-HH-MM-SS-F...>Z.<suffix>`, for example
//! `cashew-db-v7-X55 minor update 2023-10-01-01-02-59-123456Z.sql`. The timestamp embedded in the
//! name decides which snapshot is the newest; filesystem times are never consulted.

use crate::error::{ErrorType, IntoResult, Res, Result};
use crate::utils;
use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// The naming convention of snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotPattern {
    prefix: String,
    suffix: String,
    regex: Regex,
}

impl SnapshotPattern {
    pub fn new(prefix: &str, suffix: &str) -> Res<Self> {
        anyhow::ensure!(!suffix.is_empty(), "The snapshot suffix must not be empty");
        let expr = format!(
            r"^{}.*?(\d{{4}}-\d{{2}}-\d{{2}}-\d{{2}}-\d{{2}}-\d{{2}}-\d+)Z\.{}$",
            regex::escape(prefix),
            regex::escape(suffix)
        );
        let regex = Regex::new(&expr).context("Unable to build the snapshot filename pattern")?;
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            regex,
        })
    }

    /// Returns the UTC timestamp embedded in `filename`, or `None` if the name does not follow
    /// the convention.
    pub fn timestamp(&self, filename: &str) -> Option<DateTime<Utc>> {
        let captures = self.regex.captures(filename)?;
        parse_timestamp(captures.get(1)?.as_str())
    }
}

impl Display for SnapshotPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}*YYYY-MM-DD-HH-MM-SS-FFFFFFZ.{}",
            self.prefix, self.suffix
        )
    }
}

/// A located snapshot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SnapshotFile {
    path: PathBuf,
    timestamp: DateTime<Utc>,
}

impl SnapshotFile {
    /// The absolute path to the snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Returns the snapshot in `dir` with the greatest embedded timestamp. Only regular files directly
/// inside `dir` are considered. When two names carry the same timestamp, the lexicographically
/// greater name wins.
///
/// Fails with `ErrorType::NotFound` when no file matches and with `ErrorType::Io` when the
/// directory cannot be read.
pub async fn locate_latest(dir: &Path, pattern: &SnapshotPattern) -> Result<SnapshotFile> {
    let candidates = candidates(dir, pattern).await.pub_result(ErrorType::Io)?;
    let Some((timestamp, name)) = candidates.into_iter().max() else {
        return Err(anyhow!(
            "No snapshot matching '{}' found in '{}'",
            pattern,
            dir.display()
        ))
        .pub_result(ErrorType::NotFound);
    };
    let path = utils::canonicalize(dir.join(&name))
        .await
        .pub_result(ErrorType::Io)?;
    tracing::debug!("Latest snapshot is '{name}' from {timestamp}");
    Ok(SnapshotFile { path, timestamp })
}

/// Collects `(timestamp, filename)` of every matching file. The tuple order makes `max` pick the
/// newest timestamp and break ties by name.
async fn candidates(
    dir: &Path,
    pattern: &SnapshotPattern,
) -> Res<Vec<(DateTime<Utc>, String)>> {
    let md = tokio::fs::metadata(dir)
        .await
        .with_context(|| format!("The database directory '{}' does not exist", dir.display()))?;
    anyhow::ensure!(
        md.is_dir(),
        "The database path '{}' is not a directory",
        dir.display()
    );

    let mut found = Vec::new();
    let mut entries = utils::read_dir(dir).await?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Unable to list directory '{}'", dir.display()))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Unable to stat '{}'", entry.path().display()))?;
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        match pattern.timestamp(&name) {
            Some(ts) => found.push((ts, name)),
            None => tracing::trace!("Ignoring '{name}'"),
        }
    }
    Ok(found)
}

/// Parses `2023-10-01-01-02-59-123456` into a UTC timestamp. The fractional part may have any
/// number of digits and is read as a decimal fraction of a second.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let (seconds, fraction) = s.rsplit_once('-')?;
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y-%m-%d-%H-%M-%S").ok()?;
    let nanos: String = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(9)
        .collect();
    let nanos: u32 = nanos.parse().ok()?;
    let naive = naive.with_nanosecond(nanos)?;
    Some(naive.and_utc())
}
