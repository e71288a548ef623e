//! Wall-clock bucketing and reduction of reading series.

use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::reading::{Field, Node, Table};

/// Width of an aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// One point per reading.
    #[default]
    Raw,
    Hour,
    Day,
    /// ISO week, starting Monday 00:00.
    Week,
    /// Calendar month, starting on the 1st at 00:00.
    Month,
}

impl Bucket {
    /// Start of the window containing `ts`.
    pub fn floor(self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        match self {
            Bucket::Raw => ts,
            Bucket::Hour => date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(ts.hour())),
            Bucket::Day => date.and_time(NaiveTime::MIN),
            Bucket::Week => {
                let back = i64::from(date.weekday().num_days_from_monday());
                (date - Duration::days(back)).and_time(NaiveTime::MIN)
            }
            Bucket::Month => date
                .with_day(1)
                .unwrap_or(date)
                .and_time(NaiveTime::MIN),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Raw => "raw",
            Bucket::Hour => "hour",
            Bucket::Day => "day",
            Bucket::Week => "week",
            Bucket::Month => "month",
        }
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "minute" => Ok(Bucket::Raw),
            "hour" | "hourly" => Ok(Bucket::Hour),
            "day" | "daily" => Ok(Bucket::Day),
            "week" | "weekly" => Ok(Bucket::Week),
            "month" | "monthly" => Ok(Bucket::Month),
            other => Err(format!(
                "unknown bucket \"{other}\", expected raw, hour, day, week or month"
            )),
        }
    }
}

/// How the values inside one bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    Max,
    Min,
}

impl FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Reduction::Sum),
            "mean" | "avg" => Ok(Reduction::Mean),
            "max" => Ok(Reduction::Max),
            "min" => Ok(Reduction::Min),
            other => Err(format!(
                "unknown reduction \"{other}\", expected sum, mean, max or min"
            )),
        }
    }
}

/// One aggregated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Start of the bucket (the reading's own timestamp for [`Bucket::Raw`]).
    pub bucket_start: NaiveDateTime,
    pub value: f64,
    /// Readings that contributed.
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: usize,
}

impl Accumulator {
    fn new(v: f64) -> Self {
        Self {
            sum: v,
            min: v,
            max: v,
            count: 1,
        }
    }

    fn push(&mut self, v: f64) {
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.count += 1;
    }

    fn finish(&self, reduction: Reduction) -> f64 {
        match reduction {
            Reduction::Sum => self.sum,
            Reduction::Mean => self.sum / self.count as f64,
            Reduction::Max => self.max,
            Reduction::Min => self.min,
        }
    }
}

/// Groups `field` of `node` into `bucket` windows and reduces each window.
///
/// Points are ordered by bucket start. Windows without readings are omitted
/// rather than zero-filled. Readings that do not carry the node or field
/// (e.g. an absent temperature column) are skipped.
pub fn aggregate(
    table: &Table,
    node: Node,
    field: Field,
    bucket: Bucket,
    reduction: Reduction,
) -> Vec<SeriesPoint> {
    let mut points = Vec::new();
    let mut current: Option<(NaiveDateTime, Accumulator)> = None;

    // The table is time-ordered and `floor` is monotonic, so windows arrive
    // contiguously.
    for (ts, v) in table.values(node, field) {
        let start = bucket.floor(ts);
        if let Some((s, acc)) = current.as_mut()
            && *s == start
            && bucket != Bucket::Raw
        {
            acc.push(v);
            continue;
        }
        if let Some((s, acc)) = current.take() {
            points.push(point(s, &acc, reduction));
        }
        current = Some((start, Accumulator::new(v)));
    }
    if let Some((s, acc)) = current {
        points.push(point(s, &acc, reduction));
    }
    points
}

fn point(bucket_start: NaiveDateTime, acc: &Accumulator, reduction: Reduction) -> SeriesPoint {
    SeriesPoint {
        bucket_start,
        value: acc.finish(reduction),
        samples: acc.count,
    }
}

/// Energy (kWh) accrued on `node` during calendar day `date`.
pub fn energy_on(table: &Table, node: Node, date: NaiveDate) -> f64 {
    table
        .on_date(date)
        .filter_map(|r| r.value(node, Field::Energy))
        .sum()
}

/// Energy (kWh) accrued on `node` in `[from, to)`.
pub fn energy_between(table: &Table, node: Node, from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    table
        .between(from, to)
        .filter_map(|r| r.value(node, Field::Energy))
        .sum()
}
