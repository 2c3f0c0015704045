//! The export pipeline: locate the snapshot, query it, normalize the rows, drop the ones the
//! destination already has and write the rest.
//!
//! This is the single place where internal errors are classified. Failing rows are skipped during
//! normalization; a missing snapshot, a failing query or a failing sink ends the run.

use crate::api::Mode;
use crate::commands::Out;
use crate::config::{Config, SinkKind};
use crate::dedup::Existing;
use crate::error::{ErrorType, IntoResult, Result};
use crate::model::TransactionRecord;
use crate::normalize::{Normalizer, TracingObserver};
use crate::{db, sink, snapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// The directories and flags of one export run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExportRequest {
    /// The directory searched for the newest snapshot.
    pub db_dir: PathBuf,
    /// The directory of the CSV files, used by the file sink.
    pub output_dir: PathBuf,
    /// When true, nothing is written.
    pub dry_run: bool,
}

/// What an export run did.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// The snapshot that was read.
    pub snapshot: PathBuf,
    /// Rows returned by the query.
    pub fetched: usize,
    /// Rows that could not be normalized.
    pub skipped: usize,
    /// Records that were not yet in the destination.
    pub new: usize,
    pub sink: SinkKind,
    /// Where the records were written, if they were.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub dry_run: bool,
    /// The new records.
    pub records: Vec<TransactionRecord>,
}

/// Runs the export described by `config` and `request`.
pub async fn export(
    config: &Config,
    request: &ExportRequest,
    mode: Mode,
) -> Result<Out<ExportSummary>> {
    let snapshot = snapshot::locate_latest(&request.db_dir, config.pattern()).await?;
    info!("Reading {}", snapshot.path().display());

    let rows = db::fetch_transactions(snapshot.path(), config.cutoff_date())
        .await
        .pub_result(ErrorType::Query)?;

    let observer = TracingObserver;
    let normalizer = Normalizer::new(config.categories(), config.timezone(), &observer);
    let normalized = normalizer.normalize_all(&rows);
    debug!(
        "Normalized {} of {} rows",
        normalized.records.len(),
        rows.len()
    );

    let mut sink = sink::open(config, &request.output_dir, mode)
        .await
        .pub_result(ErrorType::Config)?;
    let existing_rows = sink.existing().await.pub_result(ErrorType::Sink)?;
    let existing = Existing::from_rows(config.dedup(), &existing_rows, config.date_format());
    debug!(
        "The destination holds {} known {} keys",
        existing.len(),
        existing.strategy()
    );
    let new = existing.filter(normalized.records);

    let mut summary = ExportSummary {
        snapshot: snapshot.path().to_path_buf(),
        fetched: rows.len(),
        skipped: normalized.skipped,
        new: new.len(),
        sink: config.sink(),
        location: None,
        dry_run: request.dry_run,
        records: Vec::new(),
    };

    if new.is_empty() {
        return Ok(Out::new("No new transactions to export", summary));
    }

    if request.dry_run {
        let message = format!(
            "Dry run: {} new transactions would be written to the {} sink",
            new.len(),
            config.sink()
        );
        summary.records = new;
        return Ok(Out::new(message, summary));
    }

    let written = sink.write(&new).await.pub_result(ErrorType::Sink)?;
    let message = format!(
        "Exported {} new transactions to {}",
        written.rows, written.location
    );
    summary.location = Some(written.location);
    summary.records = new;
    Ok(Out::new(message, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{header, is_header};
    use crate::sink::read_records;
    use crate::test::{TestEnv, LATEST, OLDER, ROWS};
    use crate::Delimiter;
    use serde_json::json;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{ConnectOptions, Connection};

    const DATE_FORMAT: &str = "%d.%m.%Y";

    async fn ids_in(path: &std::path::Path) -> Vec<String> {
        read_records(path, Delimiter::Tab, DATE_FORMAT)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_export_to_files() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({})).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.sink, SinkKind::File);
        assert!(summary.snapshot.ends_with(LATEST));
        assert_eq!(
            out.message(),
            format!(
                "Exported 2 new transactions to {}",
                env.output_dir().display()
            )
        );

        let current = env.output_dir().join("transactions.csv");
        let history = env.output_dir().join("transactions_history.csv");
        assert_eq!(ids_in(&current).await, vec!["1", "2"]);
        assert_eq!(ids_in(&history).await, vec!["1", "2"]);
        assert!(!env.output_dir().join("transactions_history_previous.csv").exists());

        let records = read_records(&current, Delimiter::Tab, DATE_FORMAT).await.unwrap();
        assert_eq!(records[0].description(), "Groceries");
        assert_eq!(records[0].category(), "spożywcze");
        assert_eq!(records[0].date().to_string(), "2023-01-01");
        assert_eq!(records[1].category(), "transport");

        let text = std::fs::read_to_string(&current).unwrap();
        let first_line: Vec<String> = text
            .lines()
            .next()
            .unwrap()
            .split('\t')
            .map(str::to_string)
            .collect();
        assert_eq!(first_line, header());
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({})).await;
        export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();

        let current = env.output_dir().join("transactions.csv");
        let history = env.output_dir().join("transactions_history.csv");
        let backup = env.output_dir().join("transactions_history_previous.csv");
        let before = (
            std::fs::read(&current).unwrap(),
            std::fs::read(&history).unwrap(),
        );

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.message(), "No new transactions to export");
        assert_eq!(out.structure().unwrap().new, 0);
        assert_eq!(std::fs::read(&current).unwrap(), before.0);
        assert_eq!(std::fs::read(&history).unwrap(), before.1);
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn test_only_new_transactions_are_appended() {
        let env = TestEnv::new();
        env.write_snapshot(OLDER, &ROWS[..1]).await;
        let config = env.config(json!({})).await;
        export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();

        env.write_latest(&ROWS).await;
        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().new, 1);

        let output = env.output_dir();
        assert_eq!(ids_in(&output.join("transactions.csv")).await, vec!["2"]);
        assert_eq!(
            ids_in(&output.join("transactions_history.csv")).await,
            vec!["1", "2"]
        );
        assert_eq!(
            ids_in(&output.join("transactions_history_previous.csv")).await,
            vec!["1"]
        );
    }

    #[tokio::test]
    async fn test_latest_snapshot_is_read() {
        let env = TestEnv::new();
        env.write_snapshot(OLDER, &ROWS[..1]).await;
        env.write_latest(&ROWS[1..]).await;
        std::fs::write(env.db_dir().join("invalid_file.sql"), "not a snapshot").unwrap();
        let config = env.config(json!({})).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert!(out.structure().unwrap().snapshot.ends_with(LATEST));
        assert_eq!(
            ids_in(&env.output_dir().join("transactions.csv")).await,
            vec!["2"]
        );
    }

    #[tokio::test]
    async fn test_cutoff_excludes_older_transactions() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({ "cutoff_date": "2023-01-01" })).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().fetched, 1);
        assert_eq!(
            ids_in(&env.output_dir().join("transactions.csv")).await,
            vec!["2"]
        );
    }

    #[tokio::test]
    async fn test_nothing_new_writes_no_files() {
        let env = TestEnv::new();
        env.write_latest(&[]).await;
        let config = env.config(json!({})).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.message(), "No new transactions to export");
        assert_eq!(std::fs::read_dir(env.output_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({})).await;

        let out = export(&config, &env.request(true), Mode::Test)
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.location, None);
        assert_eq!(std::fs::read_dir(env.output_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bad_rows_are_skipped() {
        let env = TestEnv::new();
        let path = env.write_latest(&ROWS).await;
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .connect()
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO transactions (transaction_pk, name, amount, category_fk, date_created)
             VALUES (3, 'Broken', 'abc', '2', 1672704000)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn.close().await.unwrap();
        let config = env.config(json!({})).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.new, 2);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_not_found() {
        let env = TestEnv::new();
        std::fs::write(env.db_dir().join("invalid_file.sql"), "").unwrap();
        let config = env.config(json!({})).await;

        let err = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
        assert_eq!(std::fs::read_dir(env.output_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_query_error() {
        let env = TestEnv::new();
        std::fs::write(
            env.db_dir().join(LATEST),
            "this is not a sqlite database, just some text that is long enough",
        )
        .unwrap();
        let config = env.config(json!({})).await;

        let err = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Query);
    }

    #[tokio::test]
    async fn test_full_value_dedup_ignores_ids() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({ "dedup": "full_value" })).await;
        std::fs::write(
            env.output_dir().join("transactions_history.csv"),
            "id\tdescription\tamount\tcategory\tdate\n\
             99\tgroceries\t50\tSPOŻYWCZE\t2023-01-01\n",
        )
        .unwrap();

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().new, 1);
        assert_eq!(
            ids_in(&env.output_dir().join("transactions.csv")).await,
            vec!["2"]
        );
        assert_eq!(
            ids_in(&env.output_dir().join("transactions_history.csv")).await,
            vec!["99", "2"]
        );
    }

    #[tokio::test]
    async fn test_export_to_sheet() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        env.seed_sheet("Transakcje", vec![header()]);
        let config = env.config(json!({ "sink": "sheet" })).await;

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.sink, SinkKind::Sheet);
        assert_eq!(summary.location.as_deref(), Some("Transakcje!A2:E3"));

        let state = env.sheet_state();
        let rows = &state.tabs["Transakcje"];
        assert_eq!(rows.len(), 3);
        assert!(is_header(rows[0].as_slice()));
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[2][0], "2");
        assert_eq!(rows[2][4], "02.01.2023");

        let out = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().new, 0);
        assert_eq!(env.sheet_state().tabs["Transakcje"].len(), 3);
    }

    #[tokio::test]
    async fn test_missing_sheet_tab_is_sink_error() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({ "sink": "sheet" })).await;

        let err = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Sink);
    }

    #[tokio::test]
    async fn test_failed_file_write_is_sink_error() {
        let env = TestEnv::new();
        env.write_latest(&ROWS).await;
        let config = env.config(json!({})).await;
        let history = env.output_dir().join("transactions_history.csv");
        let previous = "id\tdescription\tamount\tcategory\tdate\n\
                        1\tGroceries\t50,00\tspożywcze\t01.01.2023\n";
        std::fs::write(&history, previous).unwrap();
        std::fs::create_dir(env.output_dir().join("transactions.csv")).unwrap();

        let err = export(&config, &env.request(false), Mode::Test)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Sink);
        assert_eq!(std::fs::read_to_string(&history).unwrap(), previous);
        assert_eq!(
            std::fs::read_to_string(env.output_dir().join("transactions_history_previous.csv"))
                .unwrap(),
            previous
        );
    }
}
