//! CSV export of aggregated series.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::analytics::SeriesPoint;
use crate::reading::Field;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column name for the value of `field`, e.g. `power_w` or `energy_kwh`.
pub fn value_column(field: Field) -> String {
    let unit = match field {
        Field::Temperature => "c".to_string(),
        other => other.unit().to_ascii_lowercase(),
    };
    format!("{}_{unit}", field.as_str())
}

/// Exports a series to a CSV file at the given path.
///
/// # Arguments
///
/// * `points` - Aggregated series, in bucket order
/// * `field` - Quantity the series measures (names the value column)
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(points: &[SeriesPoint], field: Field, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(points, field, io::BufWriter::new(file))
}

/// Writes a series as CSV to any writer.
///
/// The header is `bucket_start,<value column>,samples`; an empty series
/// still gets its header.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(points: &[SeriesPoint], field: Field, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(["bucket_start", value_column(field).as_str(), "samples"])?;
    for p in points {
        wtr.write_record(&[
            p.bucket_start.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.4}", p.value),
            p.samples.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
