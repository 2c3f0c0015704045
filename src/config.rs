//! Configuration file handling.
//!
//! The configuration file is a JSON document, by default at
//! `<config dir>/cashew-export/config.json`. Every setting has a default, so the file is optional.
//! The file is loaded into a `ConfigFile` and then validated into an immutable `Config` that is
//! passed to each part of the pipeline.

use crate::dedup::Dedup;
use crate::error::{ErrorType, IntoResult, Res, Result};
use crate::model::{A1Range, CategoryMap, DEFAULT_SENTINEL};
use crate::snapshot::SnapshotPattern;
use crate::utils;
use anyhow::{bail, Context};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "cashew-export";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const TOKEN_JSON: &str = "token.json";
const DEFAULT_PREFIX: &str = "cashew";
const DEFAULT_SUFFIX: &str = "sql";
const DEFAULT_CUTOFF: &str = "2025-01-01";
const DEFAULT_TIMEZONE: &str = "Europe/Warsaw";
const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";
const DEFAULT_RANGE: &str = "Transakcje!A1:E";
const DEFAULT_ATTEMPTS: u32 = 2;

/// The CSV field delimiter.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    #[default]
    Tab,
    Semicolon,
    Comma,
}

serde_plain::derive_display_from_serialize!(Delimiter);
serde_plain::derive_fromstr_from_deserialize!(Delimiter);

impl Delimiter {
    pub fn byte(&self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Comma => b',',
        }
    }
}

/// Where new records are written.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// The three CSV files in the output directory.
    #[default]
    File,
    /// A range of a Google sheet.
    Sheet,
}

serde_plain::derive_display_from_serialize!(SinkKind);
serde_plain::derive_fromstr_from_deserialize!(SinkKind);

/// The validated configuration of a run.
#[derive(Debug, Clone)]
pub struct Config {
    path: Option<PathBuf>,
    pattern: SnapshotPattern,
    cutoff_date: NaiveDate,
    timezone: Tz,
    date_format: String,
    delimiter: Delimiter,
    categories: CategoryMap,
    dedup: Dedup,
    sink: SinkKind,
    sheet: SheetConfig,
}

/// The validated settings of the spreadsheet sink.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    sheet_url: String,
    spreadsheet_id: String,
    range: A1Range,
    target_row: Option<u32>,
    token_path: PathBuf,
    attempts: u32,
}

impl SheetConfig {
    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn range(&self) -> &A1Range {
        &self.range
    }

    pub fn target_row(&self) -> Option<u32> {
        self.target_row
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default(), None).unwrap()
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// - If `path` is given, the file must exist.
    /// - Otherwise the default location is used if a file exists there.
    /// - Otherwise the built-in defaults are used.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_inner(path).await.pub_result(ErrorType::Config)
    }

    async fn load_inner(path: Option<&Path>) -> Res<Self> {
        let path = match path {
            Some(p) => {
                if !utils::is_file(p).await? {
                    bail!("The config file is missing '{}'", p.display())
                }
                Some(p.to_path_buf())
            }
            None => match default_config_path() {
                Some(p) if utils::is_file(&p).await? => Some(p),
                _ => None,
            },
        };
        match path {
            Some(p) => {
                let file = ConfigFile::load(&p).await?;
                Self::from_file(file, Some(p))
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::from_file(ConfigFile::default(), None)
            }
        }
    }

    /// Validates `file` into a `Config`. Relative paths inside the file are resolved against the
    /// directory holding `path`.
    fn from_file(file: ConfigFile, path: Option<PathBuf>) -> Res<Self> {
        anyhow::ensure!(
            file.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            file.app_name
        );

        let pattern = SnapshotPattern::new(&file.snapshot_prefix, &file.snapshot_suffix)?;
        let cutoff_date = NaiveDate::parse_from_str(&file.cutoff_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid cutoff_date '{}'", file.cutoff_date))?;
        let timezone: Tz = file
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", file.timezone))?;
        validate_date_format(&file.date_format)?;
        let categories = CategoryMap::new(
            file.categories,
            &file.known_categories,
            &file.sentinel_category,
        );

        let base_dir = path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let sheet = SheetConfig::from_file(file.sheet, &base_dir)?;

        Ok(Self {
            path,
            pattern,
            cutoff_date,
            timezone,
            date_format: file.date_format,
            delimiter: file.delimiter,
            categories,
            dedup: file.dedup,
            sink: file.sink,
            sheet,
        })
    }

    /// Returns a copy of this configuration that writes to `sink`.
    pub fn with_sink(mut self, sink: SinkKind) -> Self {
        self.sink = sink;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pattern(&self) -> &SnapshotPattern {
        &self.pattern
    }

    pub fn cutoff_date(&self) -> NaiveDate {
        self.cutoff_date
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn dedup(&self) -> Dedup {
        self.dedup
    }

    pub fn sink(&self) -> SinkKind {
        self.sink
    }

    pub fn sheet(&self) -> &SheetConfig {
        &self.sheet
    }
}

impl SheetConfig {
    fn from_file(file: SheetFile, base_dir: &Path) -> Res<Self> {
        let spreadsheet_id = extract_spreadsheet_id(&file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();
        let range: A1Range = file
            .range
            .parse()
            .with_context(|| format!("Invalid sheet range '{}'", file.range))?;
        if let Some(row) = file.target_row {
            anyhow::ensure!(row > 0, "target_row must be 1 or greater");
        }
        anyhow::ensure!(file.attempts > 0, "attempts must be 1 or greater");
        let token_path = if file.token_path.is_absolute() {
            file.token_path
        } else {
            base_dir.join(file.token_path)
        };
        Ok(Self {
            sheet_url: file.sheet_url,
            spreadsheet_id,
            range,
            target_row: file.target_row,
            token_path,
            attempts: file.attempts,
        })
    }
}

/// Returns `<config dir>/cashew-export/config.json` if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_JSON))
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "cashew-export",
///   "config_version": 1,
///   "snapshot_prefix": "cashew",
///   "snapshot_suffix": "sql",
///   "cutoff_date": "2025-01-01",
///   "timezone": "Europe/Warsaw",
///   "date_format": "%d.%m.%Y",
///   "delimiter": "semicolon",
///   "sentinel_category": "inne",
///   "categories": { "2": "spożywcze", "4": "transport" },
///   "known_categories": ["rachunki"],
///   "dedup": "id",
///   "sink": "sheet",
///   "sheet": {
///     "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///     "range": "Transakcje!A1:E",
///     "token_path": "token.json"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct ConfigFile {
    app_name: String,
    config_version: u8,
    snapshot_prefix: String,
    snapshot_suffix: String,
    /// Only transactions created after midnight UTC of this date are exported.
    cutoff_date: String,
    /// IANA timezone used to turn timestamps into dates.
    timezone: String,
    /// `strftime` format used for the date column.
    date_format: String,
    delimiter: Delimiter,
    sentinel_category: String,
    /// Maps raw category keys to labels.
    categories: BTreeMap<String, String>,
    /// Labels accepted when they appear in place of a key.
    known_categories: Vec<String>,
    dedup: Dedup,
    sink: SinkKind,
    sheet: SheetFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            snapshot_prefix: DEFAULT_PREFIX.to_string(),
            snapshot_suffix: DEFAULT_SUFFIX.to_string(),
            cutoff_date: DEFAULT_CUTOFF.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            delimiter: Delimiter::default(),
            sentinel_category: DEFAULT_SENTINEL.to_string(),
            categories: default_categories(),
            known_categories: ["spożywcze", "transport", "przyjemności", "inne", "rachunki"]
                .into_iter()
                .map(String::from)
                .collect(),
            dedup: Dedup::default(),
            sink: SinkKind::default(),
            sheet: SheetFile::default(),
        }
    }
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        Ok(config)
    }

    #[cfg(test)]
    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct SheetFile {
    /// URL of the Google sheet. May be empty when the file sink is used.
    sheet_url: String,
    range: String,
    /// First row to write to. When absent, the first empty row of `range` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    target_row: Option<u32>,
    /// File holding an OAuth access token, relative to the config file or absolute.
    token_path: PathBuf,
    /// How many times each spreadsheet call is tried before giving up.
    attempts: u32,
}

impl Default for SheetFile {
    fn default() -> Self {
        Self {
            sheet_url: String::new(),
            range: DEFAULT_RANGE.to_string(),
            target_row: None,
            token_path: PathBuf::from(TOKEN_JSON),
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

fn default_categories() -> BTreeMap<String, String> {
    [
        ("2", "spożywcze"),
        ("4", "transport"),
        ("b952bfec-b4e0-4ec5-b621-0f46cbda4545", "terapia"),
        ("a15d9070-bd80-4079-8764-08445f019730", "transport"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn validate_date_format(format: &str) -> Res<()> {
    if format.trim().is_empty() {
        bail!("date_format must not be empty");
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("Invalid date_format '{format}'");
    }
    // Time and offset specifiers parse but cannot be rendered for a date.
    let sample = NaiveDate::from_ymd_opt(2025, 12, 31).context("Invalid sample date")?;
    let mut rendered = String::new();
    if write!(rendered, "{}", sample.format(format)).is_err() {
        bail!("date_format '{format}' must only use date fields");
    }
    Ok(())
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID or an error if the URL format is invalid. Returns an empty string if the URL is empty.
fn extract_spreadsheet_id(url: &str) -> Res<&str> {
    if url.is_empty() {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split(['?', '#'])
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    Err(anyhow::anyhow!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    ))
}
