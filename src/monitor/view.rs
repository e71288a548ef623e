//! Explicit view selection: which series the user is looking at.

use serde::Deserialize;

use crate::analytics::{Bucket, Reduction, SeriesPoint, aggregate};
use crate::reading::{Field, Node, Table};

/// Current chart selection.
///
/// Passed explicitly to whoever renders a series instead of living in
/// process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewState {
    pub bucket: Bucket,
    pub field: Field,
    pub node: Node,
    /// `None` uses the field's natural reduction (sum for energy, mean
    /// otherwise).
    pub reduction: Option<Reduction>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            bucket: Bucket::Hour,
            field: Field::Power,
            node: Node::Main,
            reduction: None,
        }
    }
}

impl ViewState {
    pub fn reduction(&self) -> Reduction {
        self.reduction
            .unwrap_or_else(|| self.field.default_reduction())
    }

    /// Aggregates the selected series out of `table`.
    pub fn series(&self, table: &Table) -> Vec<SeriesPoint> {
        aggregate(table, self.node, self.field, self.bucket, self.reduction())
    }

    /// Chart title such as `Main power (W), hour mean`.
    pub fn title(&self) -> String {
        format!(
            "{} {} ({}), {} {}",
            self.node,
            self.field.as_str(),
            self.field.unit(),
            self.bucket.as_str(),
            reduction_name(self.reduction())
        )
    }
}

fn reduction_name(r: Reduction) -> &'static str {
    match r {
        Reduction::Sum => "sum",
        Reduction::Mean => "mean",
        Reduction::Max => "max",
        Reduction::Min => "min",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Measurement, Reading};
    use chrono::NaiveDate;

    #[test]
    fn energy_defaults_to_sum() {
        let view = ViewState {
            field: Field::Energy,
            ..ViewState::default()
        };
        assert_eq!(view.reduction(), Reduction::Sum);
        assert_eq!(ViewState::default().reduction(), Reduction::Mean);
        let explicit = ViewState {
            reduction: Some(Reduction::Max),
            ..view
        };
        assert_eq!(explicit.reduction(), Reduction::Max);
    }

    #[test]
    fn series_uses_selection() {
        let at = |m| {
            NaiveDate::from_ymd_opt(2025, 3, 1)
                .and_then(|d| d.and_hms_opt(10, m, 0))
                .unwrap()
        };
        let m = |power| Measurement {
            voltage: 230.0,
            current: 1.0,
            power,
            energy_kwh: 0.01,
            temperature: None,
        };
        let table = Table::new(vec![
            Reading::main(at(0), m(100.0)),
            Reading::main(at(30), m(300.0)),
        ]);
        let points = ViewState::default().series(&table);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 200.0);
        assert_eq!(ViewState::default().title(), "Main power (W), hour mean");
    }
}
