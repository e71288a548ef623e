//! Cleaned, time-ordered reading table.

use chrono::{NaiveDate, NaiveDateTime};

use super::types::{Field, Node, Reading};

/// Readings ordered oldest first.
///
/// Construction sorts by timestamp with a stable sort, so rows sharing a
/// timestamp keep their sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    readings: Vec<Reading>,
}

impl Table {
    /// Builds a table from readings in any order.
    pub fn new(mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        Self { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Most recent reading.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// Readings whose calendar date equals `date`.
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .filter(move |r| r.timestamp.date() == date)
    }

    /// Readings in `[from, to)`.
    pub fn between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .filter(move |r| r.timestamp >= from && r.timestamp < to)
    }

    /// `(timestamp, value)` pairs for readings that carry `field` on `node`.
    pub fn values(&self, node: Node, field: Field) -> impl Iterator<Item = (NaiveDateTime, f64)> {
        self.readings
            .iter()
            .filter_map(move |r| r.value(node, field).map(|v| (r.timestamp, v)))
    }
}

impl From<Vec<Reading>> for Table {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}
