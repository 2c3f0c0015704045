//! The spreadsheet capability used by the sheet sink.
//!
//! The sink only ever reads a range and writes rows to a range.
//! `GoogleSheet` talks to the Google Sheets API and `TestSheet` keeps everything in memory.

mod sheet;
mod sheet_test_client;
mod token;

use crate::config::SheetConfig;
use crate::error::{ErrorType, IntoResult, Res, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub(crate) use sheet::GoogleSheet;
pub(crate) use sheet_test_client::TestSheet;
#[cfg(test)]
pub(crate) use sheet_test_client::TestSheetState;
pub(crate) use token::AccessToken;

const TEST_MODE_ENV: &str = "CASHEW_EXPORT_TEST_MODE";

/// Reads and writes rows of a spreadsheet. Ranges are in A1 notation.
#[async_trait::async_trait]
pub(crate) trait Sheet {
    /// Returns the populated rows of `range`, starting at the first row of the range.
    async fn read(&mut self, range: &str) -> Res<Vec<Vec<String>>>;

    /// Writes `rows` into `range`, which must be exactly large enough to hold them.
    async fn append(&mut self, rows: &[Vec<String>], range: &str) -> Res<()>;
}

/// Chooses between the Google API and the in-memory sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Google,
    Test,
}

serde_plain::derive_display_from_serialize!(Mode);

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "0" | "false" | "google" => Ok(Mode::Google),
            "1" | "true" | "test" => Ok(Mode::Test),
            _ => bail!("Invalid value for {TEST_MODE_ENV}: '{s}'"),
        }
    }
}

impl Mode {
    /// Reads the mode from the `CASHEW_EXPORT_TEST_MODE` environment variable, defaulting to
    /// `Mode::Google`.
    pub fn from_env() -> Result<Self> {
        let mode: Res<Self> = match std::env::var(TEST_MODE_ENV) {
            Ok(value) => value.parse(),
            Err(std::env::VarError::NotPresent) => Ok(Mode::Google),
            Err(e) => Err(e).context(format!("Unable to read {TEST_MODE_ENV}")),
        };
        mode.pub_result(ErrorType::Config)
    }
}

/// Creates the `Sheet` for `mode`.
pub(crate) async fn sheet(config: &SheetConfig, mode: Mode) -> Res<Box<dyn Sheet + Send>> {
    if config.spreadsheet_id().is_empty() {
        bail!("The sheet sink needs a sheet_url in the configuration");
    }
    match mode {
        Mode::Google => {
            let token = AccessToken::load(config.token_path()).await?;
            Ok(Box::new(GoogleSheet::new(config.spreadsheet_id(), &token)))
        }
        Mode::Test => Ok(Box::new(TestSheet::new(config.spreadsheet_id()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("".parse::<Mode>().unwrap(), Mode::Google);
        assert_eq!("google".parse::<Mode>().unwrap(), Mode::Google);
        assert_eq!("TRUE".parse::<Mode>().unwrap(), Mode::Test);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
        assert!("maybe".parse::<Mode>().is_err());
    }
}
