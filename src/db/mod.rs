//! Reads transactions out of a Cashew SQLite snapshot.
//!
//! The snapshot is opened read-only and is never modified. Every column is cast to `TEXT` by the
//! query so that rows with unusual storage classes still come back and can be judged one by one
//! during normalization.

use crate::error::Res;
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use tracing::debug;

const SELECT_TRANSACTIONS: &str = "\
SELECT CAST(transaction_pk AS TEXT), \
       CAST(name AS TEXT), \
       CAST(amount AS TEXT), \
       CAST(category_fk AS TEXT), \
       CAST(date_created AS TEXT) \
FROM transactions \
WHERE date_created > ? \
ORDER BY date_created, transaction_pk";

/// A transaction row exactly as the snapshot stores it.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RawRow {
    pub id: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub category: Option<String>,
    /// Seconds since the Unix epoch, as text.
    pub timestamp: Option<String>,
}

type Columns = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

impl From<Columns> for RawRow {
    fn from((id, description, amount, category, timestamp): Columns) -> Self {
        Self {
            id,
            description,
            amount,
            category,
            timestamp,
        }
    }
}

/// Returns the epoch seconds of midnight UTC at the start of `date`.
pub fn cutoff_epoch(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Fetches every transaction created strictly after midnight UTC of `cutoff`. The connection is
/// closed before returning, whether or not the query succeeded.
pub async fn fetch_transactions(path: &Path, cutoff: NaiveDate) -> Res<Vec<RawRow>> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await
        .with_context(|| format!("Unable to open the snapshot '{}'", path.display()))?;

    let cutoff = cutoff_epoch(cutoff);
    debug!("Querying transactions created after {cutoff}");
    let result = sqlx::query_as::<_, Columns>(SELECT_TRANSACTIONS)
        .bind(cutoff)
        .fetch_all(&mut conn)
        .await
        .with_context(|| format!("Unable to query transactions in '{}'", path.display()));

    if let Err(e) = conn.close().await {
        tracing::warn!("Unable to close the snapshot connection: {e}");
    }

    let rows = result?;
    debug!("Fetched {} rows", rows.len());
    Ok(rows.into_iter().map(RawRow::from).collect())
}
