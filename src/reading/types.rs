//! Core reading types: nodes, measured fields, and timestamped samples.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::analytics::aggregate::Reduction;

/// A metered circuit in the building.
///
/// Single-node sheets only ever populate [`Node::Main`]. Three-node sheets
/// carry one column group per node, distinguished by a column prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Incoming supply.
    Main,
    /// Circuits that must stay powered.
    Essential,
    /// Sheddable circuits.
    NonEssential,
}

impl Node {
    /// All nodes in display order.
    pub const ALL: [Node; 3] = [Node::Main, Node::Essential, Node::NonEssential];

    /// Column prefix used by three-node sheets (`M_Power`, `NE_kWh`, ...).
    pub fn column_prefix(self) -> &'static str {
        match self {
            Node::Main => "M",
            Node::Essential => "E",
            Node::NonEssential => "NE",
        }
    }

    /// Name used in config files and query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Main => "main",
            Node::Essential => "essential",
            Node::NonEssential => "non_essential",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Node::Main => "Main",
            Node::Essential => "Essential",
            Node::NonEssential => "Non-Essential",
        };
        f.pad(label)
    }
}

impl FromStr for Node {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "m" => Ok(Node::Main),
            "essential" | "e" => Ok(Node::Essential),
            "non_essential" | "non-essential" | "ne" => Ok(Node::NonEssential),
            other => Err(format!(
                "unknown node \"{other}\", expected main, essential or non_essential"
            )),
        }
    }
}

/// A measured quantity carried by every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Voltage,
    Current,
    Power,
    /// Energy accrued since the previous sample (kWh).
    Energy,
    Temperature,
}

impl Field {
    /// Energy intervals are summed; instantaneous quantities are averaged.
    pub fn default_reduction(self) -> Reduction {
        match self {
            Field::Energy => Reduction::Sum,
            _ => Reduction::Mean,
        }
    }

    /// Display unit.
    pub fn unit(self) -> &'static str {
        match self {
            Field::Voltage => "V",
            Field::Current => "A",
            Field::Power => "W",
            Field::Energy => "kWh",
            Field::Temperature => "°C",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Voltage => "voltage",
            Field::Current => "current",
            Field::Power => "power",
            Field::Energy => "energy",
            Field::Temperature => "temperature",
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voltage" | "v" => Ok(Field::Voltage),
            "current" | "i" | "a" => Ok(Field::Current),
            "power" | "p" | "w" => Ok(Field::Power),
            "energy" | "kwh" => Ok(Field::Energy),
            "temperature" | "temp" => Ok(Field::Temperature),
            other => Err(format!(
                "unknown field \"{other}\", expected voltage, current, power, energy or temperature"
            )),
        }
    }
}

/// Electrical and thermal quantities for one node at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// RMS voltage (V).
    pub voltage: f64,
    /// RMS current (A).
    pub current: f64,
    /// Active power (W).
    pub power: f64,
    /// Energy accrued since the previous sample (kWh).
    pub energy_kwh: f64,
    /// Breaker or device temperature (°C), when the sheet has the column.
    pub temperature: Option<f64>,
}

impl Measurement {
    /// Returns the value of `field`, or `None` for an absent temperature.
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Voltage => Some(self.voltage),
            Field::Current => Some(self.current),
            Field::Power => Some(self.power),
            Field::Energy => Some(self.energy_kwh),
            Field::Temperature => self.temperature,
        }
    }
}

/// One timestamped sample, possibly covering several nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Wall-clock time as written in the sheet.
    pub timestamp: NaiveDateTime,
    /// Per-node measurements.
    pub nodes: BTreeMap<Node, Measurement>,
}

impl Reading {
    /// Creates a single-node reading on [`Node::Main`].
    pub fn main(timestamp: NaiveDateTime, measurement: Measurement) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(Node::Main, measurement);
        Self { timestamp, nodes }
    }

    /// Returns the measurement for `node`, if the reading covers it.
    pub fn node(&self, node: Node) -> Option<&Measurement> {
        self.nodes.get(&node)
    }

    /// Returns `field` for `node`, if both are present.
    pub fn value(&self, node: Node, field: Field) -> Option<f64> {
        self.node(node).and_then(|m| m.get(field))
    }
}
