//! Threshold rules that classify the latest reading into an advisory state.
//!
//! Each evaluation sees only one reading. There is no hysteresis: a value
//! flapping across a limit flips the advisory on every refresh.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reading::{Node, Reading};

/// Fixed limits for the advisory rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Lowest healthy voltage (V).
    pub voltage_min_v: f64,
    /// Highest healthy voltage (V).
    pub voltage_max_v: f64,
    /// Current ceiling (A).
    pub current_max_a: f64,
    /// Thermal ceiling (°C).
    pub temperature_max_c: f64,
    /// Power above which load shedding is requested (W).
    pub power_limit_w: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            voltage_min_v: 170.0,
            voltage_max_v: 258.0,
            current_max_a: 40.0,
            temperature_max_c: 65.0,
            power_limit_w: 3_000.0,
        }
    }
}

/// Advisory severity, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryState {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for AdvisoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            AdvisoryState::Healthy => "HEALTHY",
            AdvisoryState::Warning => "WARNING",
            AdvisoryState::Critical => "CRITICAL",
        })
    }
}

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    /// Voltage outside the healthy band.
    Voltage { node: Node, volts: f64 },
    /// Current above the ceiling.
    Overcurrent { node: Node, amps: f64 },
    /// Temperature above the ceiling.
    Thermal { node: Node, celsius: f64 },
    /// Power above the shedding limit.
    PowerLimit { node: Node, watts: f64 },
}

impl Fault {
    pub fn severity(&self) -> AdvisoryState {
        match self {
            Fault::PowerLimit { .. } => AdvisoryState::Warning,
            _ => AdvisoryState::Critical,
        }
    }

    pub fn node(&self) -> Node {
        match *self {
            Fault::Voltage { node, .. }
            | Fault::Overcurrent { node, .. }
            | Fault::Thermal { node, .. }
            | Fault::PowerLimit { node, .. } => node,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Voltage { node, volts } => write!(f, "{node}: voltage fault ({volts:.1} V)"),
            Fault::Overcurrent { node, amps } => write!(f, "{node}: overcurrent ({amps:.1} A)"),
            Fault::Thermal { node, celsius } => {
                write!(f, "{node}: thermal fault ({celsius:.1} °C)")
            }
            Fault::PowerLimit { node, watts } => {
                write!(f, "{node}: power limit exceeded ({watts:.0} W)")
            }
        }
    }
}

/// Derived health classification of one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub state: AdvisoryState,
    pub faults: Vec<Fault>,
}

impl Advisory {
    pub fn healthy() -> Self {
        Self {
            state: AdvisoryState::Healthy,
            faults: Vec::new(),
        }
    }

    /// `true` when any node's voltage is outside the band.
    pub fn has_voltage_fault(&self) -> bool {
        self.faults.iter().any(|f| matches!(f, Fault::Voltage { .. }))
    }

    /// Power on `node` exceeded the shedding limit.
    pub fn power_limit_exceeded(&self, node: Node) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, Fault::PowerLimit { node: n, .. } if *n == node))
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advisory: {}", self.state)?;
        for fault in &self.faults {
            write!(f, "\n  - {fault}")?;
        }
        Ok(())
    }
}

/// Applies the rule table to every node of `reading`.
pub fn evaluate(reading: &Reading, t: &Thresholds) -> Advisory {
    let mut faults = Vec::new();
    for (&node, m) in &reading.nodes {
        if m.voltage < t.voltage_min_v || m.voltage > t.voltage_max_v {
            faults.push(Fault::Voltage {
                node,
                volts: m.voltage,
            });
        }
        if m.current > t.current_max_a {
            faults.push(Fault::Overcurrent {
                node,
                amps: m.current,
            });
        }
        if let Some(celsius) = m.temperature
            && celsius > t.temperature_max_c
        {
            faults.push(Fault::Thermal { node, celsius });
        }
        if m.power > t.power_limit_w {
            faults.push(Fault::PowerLimit {
                node,
                watts: m.power,
            });
        }
    }

    let state = faults
        .iter()
        .map(Fault::severity)
        .max()
        .unwrap_or(AdvisoryState::Healthy);
    Advisory { state, faults }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Measurement;
    use chrono::NaiveDate;

    fn reading(v: f64, i: f64, p: f64, temp: Option<f64>) -> Reading {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        Reading::main(
            ts,
            Measurement {
                voltage: v,
                current: i,
                power: p,
                energy_kwh: 0.01,
                temperature: temp,
            },
        )
    }

    #[test]
    fn nominal_reading_is_healthy() {
        let a = evaluate(&reading(230.0, 5.0, 1150.0, Some(40.0)), &Thresholds::default());
        assert_eq!(a, Advisory::healthy());
    }

    #[test]
    fn voltage_fault_iff_outside_band() {
        let t = Thresholds::default();
        for (v, want) in [
            (169.9, true),
            (170.0, false),
            (230.0, false),
            (258.0, false),
            (258.1, true),
        ] {
            // Other fields are pushed past their own limits to show independence.
            for (i, p, temp) in [(1.0, 100.0, None), (99.0, 99_999.0, Some(99.0))] {
                let a = evaluate(&reading(v, i, p, temp), &t);
                assert_eq!(a.has_voltage_fault(), want, "V={v} I={i} P={p}");
            }
        }
    }

    #[test]
    fn overcurrent_and_thermal_are_critical() {
        let t = Thresholds::default();
        let a = evaluate(&reading(230.0, 41.0, 1000.0, None), &t);
        assert_eq!(a.state, AdvisoryState::Critical);
        let a = evaluate(&reading(230.0, 5.0, 1000.0, Some(65.5)), &t);
        assert_eq!(a.state, AdvisoryState::Critical);
        assert!(matches!(a.faults[0], Fault::Thermal { .. }));
    }

    #[test]
    fn power_limit_is_a_warning() {
        let a = evaluate(&reading(230.0, 14.0, 3200.0, None), &Thresholds::default());
        assert_eq!(a.state, AdvisoryState::Warning);
        assert!(a.power_limit_exceeded(Node::Main));
        assert!(!a.power_limit_exceeded(Node::NonEssential));
    }

    #[test]
    fn worst_fault_wins() {
        let a = evaluate(&reading(150.0, 5.0, 3200.0, None), &Thresholds::default());
        assert_eq!(a.state, AdvisoryState::Critical);
        assert_eq!(a.faults.len(), 2);
    }

    #[test]
    fn flapping_value_flips_immediately() {
        let t = Thresholds::default();
        let states: Vec<_> = [259.0, 257.0, 259.0]
            .into_iter()
            .map(|v| evaluate(&reading(v, 5.0, 1000.0, None), &t).state)
            .collect();
        assert_eq!(
            states,
            vec![
                AdvisoryState::Critical,
                AdvisoryState::Healthy,
                AdvisoryState::Critical
            ]
        );
    }
}
