//! Error types for fetching, cleaning, and relay control.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain CSV text from the sheet.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned HTTP {0}")]
    Status(u16),

    #[error("cannot read \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to turn CSV text into a usable table.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("sheet is empty")]
    Empty,

    #[error("cannot read CSV header: {0}")]
    Header(#[from] csv::Error),

    #[error("column mismatch, missing: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Failure to deliver a command to the automation webhook.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("webhook URL is not configured")]
    NotConfigured,

    #[error("unknown device \"{0}\"")]
    UnknownDevice(String),

    #[error("missing schedule field: {0}")]
    MissingField(&'static str),

    #[error("webhook request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("webhook returned HTTP {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },
}
