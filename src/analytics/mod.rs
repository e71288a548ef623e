//! Time-bucketed series and dashboard summaries.

pub mod aggregate;
pub mod summary;

pub use aggregate::{Bucket, Reduction, SeriesPoint, aggregate};
pub use summary::{EnergyTotals, Summary};
