//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::NamedTempFile;

use bems_monitor::config::MonitorConfig;
use bems_monitor::ingest::Source;
use bems_monitor::monitor::Monitor;

/// Header of a single-node sheet.
pub const SINGLE_HEADER: &str = "Timestamp,Voltage,Current,Power,kWh_Interval";

/// Header of a three-node sheet without temperature columns.
pub const THREE_HEADER: &str = "Timestamp,\
    M_Voltage,M_Current,M_Power,M_kWh,\
    E_Voltage,E_Current,E_Power,E_kWh,\
    NE_Voltage,NE_Current,NE_Power,NE_kWh";

/// One single-node data row.
pub fn single_row(ts: &str, volts: f64, amps: f64, watts: f64, kwh: f64) -> String {
    format!("{ts},{volts},{amps},{watts},{kwh}")
}

/// One three-node data row; each node is `(V, A, W, kWh)`.
pub fn three_row(ts: &str, nodes: [(f64, f64, f64, f64); 3]) -> String {
    let mut row = ts.to_string();
    for (v, a, w, kwh) in nodes {
        row.push_str(&format!(",{v},{a},{w},{kwh}"));
    }
    row
}

/// Joins a header and rows into sheet text.
pub fn sheet(header: &str, rows: &[String]) -> String {
    let mut text = String::from(header);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

/// Writes sheet text to a temporary file kept alive by the returned handle.
pub fn write_sheet(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

/// Monitor reading `text` from a temporary file.
pub fn file_monitor(config: MonitorConfig, text: &str) -> (Monitor, NamedTempFile) {
    let file = write_sheet(text);
    let monitor = Monitor::new(config, Source::File(file.path().to_path_buf())).unwrap();
    (monitor, file)
}

/// 2025-03-`day` at `h`:`m`.
pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .unwrap()
}

/// Single-node preset with shedding of `relay_1` through `webhook_url`.
pub fn shedding_config(webhook_url: String) -> MonitorConfig {
    let mut config = MonitorConfig::single_node();
    config.source.cache_bust = false;
    config.relay.webhook_url = webhook_url;
    config.relay.max_attempts = 1;
    config.relay.settle_delay_secs = 0;
    config.shedding.enabled = true;
    config.shedding.device = "relay_1".to_string();
    config
}
