use serde::Deserialize;

use super::types::{Field, Node};

/// Name of the timestamp column in every layout.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Which column naming convention a sheet follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `Voltage`, `Current`, `Power`, `kWh_Interval`, optional `Temp`.
    #[default]
    SingleNode,
    /// `M_*`, `E_*`, `NE_*` column groups for the three nodes.
    ThreeNode,
}

impl Layout {
    /// Nodes carried by sheets in this layout.
    pub fn nodes(self) -> &'static [Node] {
        match self {
            Layout::SingleNode => &[Node::Main],
            Layout::ThreeNode => &Node::ALL,
        }
    }

    /// Header name of `field` for `node`.
    pub fn column(self, node: Node, field: Field) -> String {
        match self {
            Layout::SingleNode => match field {
                Field::Voltage => "Voltage".to_string(),
                Field::Current => "Current".to_string(),
                Field::Power => "Power".to_string(),
                Field::Energy => "kWh_Interval".to_string(),
                Field::Temperature => "Temp".to_string(),
            },
            Layout::ThreeNode => {
                let suffix = match field {
                    Field::Voltage => "Voltage",
                    Field::Current => "Current",
                    Field::Power => "Power",
                    Field::Energy => "kWh",
                    Field::Temperature => "Temp",
                };
                format!("{}_{suffix}", node.column_prefix())
            }
        }
    }

    /// Columns that must be present for a sheet to be usable.
    pub fn required_columns(self) -> Vec<String> {
        let mut cols = Vec::new();
        for &node in self.nodes() {
            for field in [Field::Voltage, Field::Current, Field::Power, Field::Energy] {
                cols.push(self.column(node, field));
            }
        }
        cols
    }
}
