//! Schedule list read from the second sheet tab.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::ingest::Fetcher;

/// One row of the schedule tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub device: String,
    pub date: String,
    pub time: String,
    /// Commanded relay state.
    pub state: bool,
    /// `once`, `daily`, ...
    pub repeat: String,
}

/// A schedule entry to be created through the webhook. The webhook assigns
/// the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub device: String,
    pub date: String,
    pub time: String,
    pub state: bool,
    #[serde(default = "default_repeat")]
    pub repeat: String,
}

fn default_repeat() -> String {
    "once".to_string()
}

impl NewSchedule {
    /// # Errors
    ///
    /// Returns `RelayError::MissingField` naming the first blank field.
    pub fn validate(&self) -> Result<(), RelayError> {
        for (name, value) in [
            ("device", &self.device),
            ("date", &self.date),
            ("time", &self.time),
            ("repeat", &self.repeat),
        ] {
            if value.trim().is_empty() {
                return Err(RelayError::MissingField(name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Device")]
    device: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Repeat", default)]
    repeat: String,
}

fn parse_state(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

impl RawEntry {
    fn into_entry(self) -> Option<ScheduleEntry> {
        let state = parse_state(&self.state)?;
        let entry = ScheduleEntry {
            id: self.id,
            device: self.device,
            date: self.date,
            time: self.time,
            state,
            repeat: self.repeat,
        };
        let complete = [&entry.id, &entry.device, &entry.date, &entry.time]
            .iter()
            .all(|v| !v.is_empty());
        complete.then_some(entry)
    }
}

/// Parses the schedule CSV. Rows that fail to decode or have a blank
/// required cell are skipped.
pub fn parse_schedule(text: &str) -> Vec<ScheduleEntry> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for record in reader.deserialize::<RawEntry>() {
        match record.ok().and_then(RawEntry::into_entry) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "skipped malformed schedule rows");
    }
    entries
}

/// Fetches and parses the schedule tab. A failed fetch yields an empty list.
pub async fn fetch_schedule(fetcher: &Fetcher) -> Vec<ScheduleEntry> {
    match fetcher.fetch().await {
        Ok(text) => parse_schedule(&text),
        Err(e) => {
            warn!(error = %e, "schedule fetch failed");
            Vec::new()
        }
    }
}
