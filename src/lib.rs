//! Building energy monitor: polls a published meter sheet, cleans and
//! aggregates the readings, raises advisories, and drives relays through an
//! automation webhook.

pub mod alert;
/// Time bucketing and dashboard summaries.
pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod io;
pub mod monitor;
pub mod reading;
pub mod relay;
pub mod shedding;

#[cfg(feature = "api")]
pub mod api;
