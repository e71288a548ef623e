//! Turns a raw sheet export into a [`Table`].
//!
//! Parsing is lenient: malformed lines are skipped, header names are trimmed,
//! and any row whose timestamp or numeric cells fail to parse is dropped
//! rather than coerced to a sentinel.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use super::timestamp::parse_timestamp;
use crate::error::CleanError;
use crate::reading::schema::TIMESTAMP_COLUMN;
use crate::reading::{Field, Layout, Measurement, Node, Reading, Table};

/// Parsing options derived from the source configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    pub layout: Layout,
    pub day_first: bool,
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Data lines seen after the header.
    pub total_rows: usize,
    /// Rows that made it into the table.
    pub kept_rows: usize,
    /// Lines the CSV reader could not decode or with the wrong field count.
    pub malformed_rows: usize,
    /// Decoded rows with an unparsable timestamp or numeric cell.
    pub dropped_rows: usize,
    /// Kept rows whose energy interval is negative.
    pub negative_energy_rows: usize,
    /// The first column stood in for a missing `Timestamp` header.
    pub timestamp_fallback: bool,
}

/// Column indices for one node.
struct NodeColumns {
    node: Node,
    voltage: usize,
    current: usize,
    power: usize,
    energy: usize,
    temperature: Option<usize>,
}

impl NodeColumns {
    fn parse(&self, record: &csv::StringRecord) -> Option<Measurement> {
        let temperature = match self.temperature {
            Some(i) => Some(parse_number(record.get(i)?)?),
            None => None,
        };
        Some(Measurement {
            voltage: parse_number(record.get(self.voltage)?)?,
            current: parse_number(record.get(self.current)?)?,
            power: parse_number(record.get(self.power)?)?,
            energy_kwh: parse_number(record.get(self.energy)?)?,
            temperature,
        })
    }
}

/// Cleans CSV text into a table of readings, oldest first.
///
/// # Errors
///
/// Returns [`CleanError::Empty`] when there is no header,
/// [`CleanError::Header`] when the header cannot be decoded, and
/// [`CleanError::MissingColumns`] when the layout's required columns are
/// absent.
pub fn clean(text: &str, options: CleanOptions) -> Result<(Table, CleanReport), CleanError> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(CleanError::Empty);
    }

    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Err(CleanError::Empty);
    };
    let headers = decode_line(header_line, csv::Trim::All)?.unwrap_or_default();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(CleanError::Empty);
    }

    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h, i))
        .collect();

    let mut report = CleanReport::default();
    let ts_col = match index.get(TIMESTAMP_COLUMN) {
        Some(&i) => i,
        None => {
            debug!(
                first_column = headers.get(0).unwrap_or(""),
                "no Timestamp column, using the first column"
            );
            report.timestamp_fallback = true;
            0
        }
    };

    let columns = resolve_columns(options.layout, &index)?;
    let width = headers.len();

    let mut readings = Vec::new();
    // Each line decodes on its own so a stray quote cannot swallow later rows.
    for (n, line) in lines {
        report.total_rows += 1;
        let record = match decode_line(line, csv::Trim::None) {
            Ok(Some(r)) if r.len() == width => r,
            Ok(_) => {
                debug!(line = n + 1, "wrong field count");
                report.malformed_rows += 1;
                continue;
            }
            Err(e) => {
                debug!(line = n + 1, error = %e, "undecodable CSV line");
                report.malformed_rows += 1;
                continue;
            }
        };

        if record.iter().all(|c| c.trim().is_empty()) {
            // Trailing blank rows are common in published sheets.
            report.dropped_rows += 1;
            continue;
        }

        match parse_row(&record, ts_col, &columns, options.day_first) {
            Some(reading) => {
                if reading.nodes.values().any(|m| m.energy_kwh < 0.0) {
                    report.negative_energy_rows += 1;
                }
                readings.push(reading);
            }
            None => report.dropped_rows += 1,
        }
    }

    report.kept_rows = readings.len();
    if report.negative_energy_rows > 0 {
        warn!(
            rows = report.negative_energy_rows,
            "readings with negative energy interval"
        );
    }
    debug!(
        total = report.total_rows,
        kept = report.kept_rows,
        malformed = report.malformed_rows,
        dropped = report.dropped_rows,
        "cleaned sheet"
    );

    Ok((Table::new(readings), report))
}

/// Decodes a single CSV line into a record.
fn decode_line(line: &str, trim: csv::Trim) -> Result<Option<csv::StringRecord>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(trim)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    Ok(rdr.read_record(&mut record)?.then_some(record))
}

fn resolve_columns(
    layout: Layout,
    index: &HashMap<&str, usize>,
) -> Result<Vec<NodeColumns>, CleanError> {
    let missing: Vec<String> = layout
        .required_columns()
        .into_iter()
        .filter(|c| !index.contains_key(c.as_str()))
        .collect();
    if !missing.is_empty() {
        return Err(CleanError::MissingColumns(missing));
    }

    let col = |node: Node, field: Field| index.get(layout.column(node, field).as_str()).copied();
    Ok(layout
        .nodes()
        .iter()
        .filter_map(|&node| {
            Some(NodeColumns {
                node,
                voltage: col(node, Field::Voltage)?,
                current: col(node, Field::Current)?,
                power: col(node, Field::Power)?,
                energy: col(node, Field::Energy)?,
                temperature: col(node, Field::Temperature),
            })
        })
        .collect())
}

fn parse_row(
    record: &csv::StringRecord,
    ts_col: usize,
    columns: &[NodeColumns],
    day_first: bool,
) -> Option<Reading> {
    let timestamp = parse_timestamp(record.get(ts_col)?, day_first)?;
    let mut nodes = BTreeMap::new();
    for c in columns {
        nodes.insert(c.node, c.parse(record)?);
    }
    Some(Reading { timestamp, nodes })
}

/// Parses a numeric cell; blanks, text and non-finite values are rejected.
fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: CleanOptions = CleanOptions {
        layout: Layout::SingleNode,
        day_first: false,
    };

    #[test]
    fn trims_header_whitespace() {
        let csv = " Timestamp , Voltage ,Current, Power ,kWh_Interval \n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 1);
        assert!(!report.timestamp_fallback);
    }

    #[test]
    fn first_column_stands_in_for_missing_timestamp() {
        let csv = "Time,Voltage,Current,Power,kWh_Interval\n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 1);
        assert!(report.timestamp_fallback);
    }

    #[test]
    fn drops_rows_with_bad_cells() {
        let csv = "Timestamp,Voltage,Current,Power,kWh_Interval\n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n\
                   not a time,230,5,1150,0.02\n\
                   2025-03-01 10:02:00,ERR,5,1150,0.02\n\
                   2025-03-01 10:03:00,230,5,,0.02\n\
                   2025-03-01 10:04:00,230,5,NaN,0.02\n\
                   2025-03-01 10:05:00,231,5,1155,0.02\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(report.dropped_rows, 4);
        assert_eq!(report.kept_rows, 2);
    }

    #[test]
    fn skips_lines_with_wrong_field_count() {
        let csv = "Timestamp,Voltage,Current,Power,kWh_Interval\n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n\
                   2025-03-01 10:01:00,230,5\n\
                   2025-03-01 10:02:00,230,5,1150,0.02,extra\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(report.malformed_rows, 2);
    }

    #[test]
    fn unterminated_quote_only_costs_its_own_line() {
        let csv = "Timestamp,Voltage,Current,Power,kWh_Interval\n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n\
                   2025-03-01 10:01:00,\"230,5,1150,0.02\n\
                   2025-03-01 10:02:00,231,5,1155,0.02\n\
                   2025-03-01 10:03:00,232,5,1160,0.02\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(report.total_rows, 4);
    }

    #[test]
    fn blank_lines_are_not_rows() {
        let csv = "\nTimestamp,Voltage,Current,Power,kWh_Interval\n\n\
                   2025-03-01 10:00:00,230,5,1150,0.02\n   \n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(report.total_rows, 1);
    }

    #[test]
    fn reports_missing_columns() {
        let csv = "Timestamp,Voltage,Power\n2025-03-01 10:00:00,230,1150\n";
        match clean(csv, SINGLE) {
            Err(CleanError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["Current".to_string(), "kWh_Interval".to_string()]);
            }
            other => panic!("expected column mismatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_text_is_an_error() {
        assert!(matches!(clean("  \n", SINGLE), Err(CleanError::Empty)));
    }

    #[test]
    fn optional_temperature_column() {
        let csv = "Timestamp,Voltage,Current,Power,kWh_Interval,Temp\n\
                   2025-03-01 10:00:00,230,5,1150,0.02,41.5\n";
        let (table, _) = clean(csv, SINGLE).unwrap();
        assert_eq!(
            table.latest().and_then(|r| r.value(Node::Main, Field::Temperature)),
            Some(41.5)
        );
    }

    #[test]
    fn counts_negative_energy_but_keeps_row() {
        let csv = "Timestamp,Voltage,Current,Power,kWh_Interval\n\
                   2025-03-01 10:00:00,230,5,1150,-0.01\n";
        let (table, report) = clean(csv, SINGLE).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(report.negative_energy_rows, 1);
    }

    #[test]
    fn three_node_layout_reads_prefixed_groups() {
        let csv = "Timestamp,M_Voltage,M_Current,M_Power,M_kWh,\
                   E_Voltage,E_Current,E_Power,E_kWh,\
                   NE_Voltage,NE_Current,NE_Power,NE_kWh\n\
                   2025-03-01 10:00:00,230,9,2070,0.03,230,4,920,0.015,230,5,1150,0.015\n";
        let opts = CleanOptions {
            layout: Layout::ThreeNode,
            day_first: false,
        };
        let (table, _) = clean(csv, opts).unwrap();
        let latest = table.latest().unwrap();
        assert_eq!(latest.nodes.len(), 3);
        assert_eq!(latest.value(Node::NonEssential, Field::Power), Some(1150.0));
        assert_eq!(latest.value(Node::Main, Field::Energy), Some(0.03));
    }
}
