//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that the whole export can
//! be run, top-to-bottom, without using Google Sheets (`CASHEW_EXPORT_TEST_MODE=1`).

use crate::api::Sheet;
use crate::error::Res;
use crate::model::A1Range;
use anyhow::bail;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

/// The contents of one in-memory spreadsheet.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub(crate) struct TestSheetState {
    /// Rows of each tab, keyed by tab name. Row 1 of the tab is index 0.
    pub(crate) tabs: HashMap<String, Vec<Vec<String>>>,
    /// The next this many calls fail, to exercise retries.
    pub(crate) failures: u32,
}

fn states() -> &'static Mutex<HashMap<String, TestSheetState>> {
    static STATES: OnceLock<Mutex<HashMap<String, TestSheetState>>> = OnceLock::new();
    STATES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// An implementation of the `Sheet` trait that does not use Google sheets. Each spreadsheet id maps
/// to a process-wide in-memory state, so separate `TestSheet` objects with the same id see the same
/// data.
pub(crate) struct TestSheet {
    spreadsheet_id: String,
}

impl TestSheet {
    pub(crate) fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn get_state(&self) -> TestSheetState {
        let states = states().lock().unwrap_or_else(PoisonError::into_inner);
        states
            .get(&self.spreadsheet_id)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn set_state(&self, state: TestSheetState) {
        let mut states = states().lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(self.spreadsheet_id.clone(), state);
    }

    /// Runs `f` on this spreadsheet's state unless a failure was scheduled.
    fn with_state<T>(&self, f: impl FnOnce(&mut TestSheetState) -> Res<T>) -> Res<T> {
        let mut states = states().lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(self.spreadsheet_id.clone()).or_default();
        if state.failures > 0 {
            state.failures -= 1;
            bail!("Simulated failure of the test sheet '{}'", self.spreadsheet_id);
        }
        f(state)
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn read(&mut self, range: &str) -> Res<Vec<Vec<String>>> {
        let range: A1Range = range.parse()?;
        self.with_state(|state| {
            let Some(tab) = state.tabs.get(range.sheet()) else {
                bail!("Sheet '{}' not found", range.sheet());
            };
            let first = (range.start_row() - 1) as usize;
            let last = range
                .end_row()
                .map(|r| r as usize)
                .unwrap_or(tab.len())
                .min(tab.len());
            let start_col = (range.start_col() - 1) as usize;
            let mut rows: Vec<Vec<String>> = tab
                .get(first..last.max(first))
                .unwrap_or_default()
                .iter()
                .map(|row| {
                    let end_col = range
                        .end_col()
                        .map(|c| c as usize)
                        .unwrap_or(row.len())
                        .min(row.len());
                    row.get(start_col..end_col.max(start_col))
                        .unwrap_or_default()
                        .to_vec()
                })
                .collect();
            // Like the API, trailing empty rows are not returned.
            while rows
                .last()
                .is_some_and(|row| row.iter().all(|cell| cell.is_empty()))
            {
                rows.pop();
            }
            Ok(rows)
        })
    }

    async fn append(&mut self, rows: &[Vec<String>], range: &str) -> Res<()> {
        let range: A1Range = range.parse()?;
        self.with_state(|state| {
            let tab = state.tabs.entry(range.sheet().to_string()).or_default();
            let start_col = (range.start_col() - 1) as usize;
            for (i, values) in rows.iter().enumerate() {
                let ix = (range.start_row() - 1) as usize + i;
                if tab.len() <= ix {
                    tab.resize(ix + 1, Vec::new());
                }
                let row = &mut tab[ix];
                if row.len() < start_col + values.len() {
                    row.resize(start_col + values.len(), String::new());
                }
                row[start_col..start_col + values.len()].clone_from_slice(values);
            }
            Ok(())
        })
    }
}
