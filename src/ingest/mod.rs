//! Fetch-and-clean stage of the refresh cycle.

pub mod clean;
pub mod fetch;
pub mod timestamp;

use serde::Serialize;
use tracing::warn;

use crate::error::CleanError;
use crate::reading::Table;

pub use clean::{CleanOptions, CleanReport, clean};
pub use fetch::{Fetcher, Source};

/// Why a refresh produced nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NoDataReason {
    /// The sheet could not be fetched or decoded; the view shows "syncing".
    Syncing(String),
    /// Required columns are absent from the header.
    ColumnMismatch(Vec<String>),
    /// The sheet parsed but no row survived cleaning.
    Empty,
}

/// Result of one fetch-and-clean pass. Never an error.
#[derive(Debug, Clone)]
pub enum DataState {
    Ready { table: Table, report: CleanReport },
    NoData(NoDataReason),
}

impl DataState {
    /// The cleaned table, if any rows survived.
    pub fn table(&self) -> Option<&Table> {
        match self {
            DataState::Ready { table, .. } => Some(table),
            DataState::NoData(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DataState::Ready { .. })
    }
}

/// Fetches and cleans one snapshot of the sheet.
///
/// Transport, decoding, and schema failures are logged and folded into
/// [`DataState::NoData`] instead of being propagated.
pub async fn load_table(fetcher: &Fetcher, options: CleanOptions) -> DataState {
    let text = match fetcher.fetch().await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "sheet fetch failed");
            return DataState::NoData(NoDataReason::Syncing(e.to_string()));
        }
    };
    from_text(&text, options)
}

/// Cleans already-fetched text into a [`DataState`].
pub fn from_text(text: &str, options: CleanOptions) -> DataState {
    match clean(text, options) {
        Ok((table, _)) if table.is_empty() => DataState::NoData(NoDataReason::Empty),
        Ok((table, report)) => DataState::Ready { table, report },
        Err(CleanError::MissingColumns(cols)) => {
            warn!(missing = ?cols, "sheet column mismatch");
            DataState::NoData(NoDataReason::ColumnMismatch(cols))
        }
        Err(CleanError::Empty) => DataState::NoData(NoDataReason::Empty),
        Err(e) => {
            warn!(error = %e, "sheet could not be parsed");
            DataState::NoData(NoDataReason::Syncing(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_sheet_is_empty() {
        let state = from_text(
            "Timestamp,Voltage,Current,Power,kWh_Interval\n",
            CleanOptions::default(),
        );
        assert!(matches!(state, DataState::NoData(NoDataReason::Empty)));
    }

    #[test]
    fn column_mismatch_is_reported() {
        let state = from_text("Timestamp,Watts\n2025-03-01 10:00,5\n", CleanOptions::default());
        match state {
            DataState::NoData(NoDataReason::ColumnMismatch(cols)) => assert_eq!(cols.len(), 4),
            other => panic!("expected column mismatch, got {other:?}"),
        }
    }

    #[test]
    fn html_page_instead_of_csv_is_not_ready() {
        let state = from_text(
            "<!DOCTYPE html><html><body>Sign in</body></html>",
            CleanOptions::default(),
        );
        assert!(!state.is_ready());
    }
}
