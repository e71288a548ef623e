//! Readings, the sheet layouts they come from, and the cleaned table.

/// Column layouts understood by the cleaner.
pub mod schema;
pub mod table;
pub mod types;

pub use schema::Layout;
pub use table::Table;
pub use types::{Field, Measurement, Node, Reading};
