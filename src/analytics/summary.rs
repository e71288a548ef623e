//! Dashboard metric cards computed from a cleaned table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::aggregate::{Bucket, energy_between, energy_on};
use crate::reading::{Field, Measurement, Node, Table};

/// Energy totals for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyTotals {
    /// Energy accrued on the reference date (kWh).
    pub today_kwh: f64,
    /// Monday 00:00 up to the end of the reference date (kWh).
    pub week_kwh: f64,
    /// 1st of the month 00:00 up to the end of the reference date (kWh).
    pub month_kwh: f64,
    /// Everything in the sheet (kWh).
    pub total_kwh: f64,
    /// Highest instantaneous power on the reference date (W).
    pub peak_power_today_w: Option<f64>,
    /// Readings on the reference date.
    pub samples_today: usize,
}

/// Latest values and energy totals, one entry per node.
///
/// Computed post-hoc from a [`Table`] so the cards always agree with the
/// series behind the charts.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Date the "today" figures refer to.
    pub date: NaiveDate,
    /// Timestamp of the most recent reading.
    pub latest_at: Option<NaiveDateTime>,
    /// Most recent measurement per node.
    pub latest: BTreeMap<Node, Measurement>,
    /// Energy totals per node.
    pub energy: BTreeMap<Node, EnergyTotals>,
    /// Readings in the table.
    pub readings: usize,
}

impl Summary {
    /// Computes the cards for `today`.
    ///
    /// `today` is supplied by the caller (normally the local date at call
    /// time), so the figures roll over as the clock passes midnight.
    pub fn from_table(table: &Table, today: NaiveDate) -> Self {
        let latest_reading = table.latest();
        let latest = latest_reading
            .map(|r| r.nodes.clone())
            .unwrap_or_default();

        let day_end = (today + Duration::days(1)).and_time(NaiveTime::MIN);
        let week_start = Bucket::Week.floor(today.and_time(NaiveTime::MIN));
        let month_start = today
            .with_day(1)
            .unwrap_or(today)
            .and_time(NaiveTime::MIN);

        let nodes: Vec<Node> = table
            .readings()
            .iter()
            .flat_map(|r| r.nodes.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut energy = BTreeMap::new();
        for node in nodes {
            let today_powers: Vec<f64> = table
                .on_date(today)
                .filter_map(|r| r.value(node, Field::Power))
                .collect();
            energy.insert(
                node,
                EnergyTotals {
                    today_kwh: energy_on(table, node, today),
                    week_kwh: energy_between(table, node, week_start, day_end),
                    month_kwh: energy_between(table, node, month_start, day_end),
                    total_kwh: table.values(node, Field::Energy).map(|(_, v)| v).sum(),
                    peak_power_today_w: today_powers.iter().copied().reduce(f64::max),
                    samples_today: today_powers.len(),
                },
            );
        }

        Self {
            date: today,
            latest_at: latest_reading.map(|r| r.timestamp),
            latest,
            energy,
            readings: table.len(),
        }
    }

    /// Today's energy on `node`, zero when the node is absent.
    pub fn today_kwh(&self, node: Node) -> f64 {
        self.energy.get(&node).map_or(0.0, |e| e.today_kwh)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Summary ({}) ---", self.date)?;
        match self.latest_at {
            Some(ts) => writeln!(f, "Last reading:          {ts}")?,
            None => writeln!(f, "Last reading:          none")?,
        }
        for (node, m) in &self.latest {
            writeln!(
                f,
                "{node:<14} {:>7.1} V  {:>6.2} A  {:>8.1} W{}",
                m.voltage,
                m.current,
                m.power,
                m.temperature
                    .map(|t| format!("  {t:.1} °C"))
                    .unwrap_or_default()
            )?;
        }
        for (node, e) in &self.energy {
            writeln!(
                f,
                "{node:<14} today {:.2} kWh | week {:.2} kWh | month {:.2} kWh | peak {}",
                e.today_kwh,
                e.week_kwh,
                e.month_kwh,
                e.peak_power_today_w
                    .map(|p| format!("{p:.0} W"))
                    .unwrap_or_else(|| "n/a".to_string())
            )?;
        }
        write!(f, "Readings:              {}", self.readings)
    }
}
