//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::analytics::SeriesPoint;
use crate::monitor::ViewState;

/// Aggregated series for the selected view.
#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    /// Chart title, e.g. `Main power (W), hour mean`.
    pub title: String,
    /// Unit of `points[].value`.
    pub unit: &'static str,
    /// Echo of the resolved selection.
    pub view: ViewEcho,
    pub points: Vec<SeriesPoint>,
}

/// Selection with the reduction resolved.
#[derive(Debug, Serialize)]
pub struct ViewEcho {
    pub bucket: &'static str,
    pub field: &'static str,
    pub node: &'static str,
    pub reduction: crate::analytics::Reduction,
}

impl From<&ViewState> for ViewEcho {
    fn from(v: &ViewState) -> Self {
        Self {
            bucket: v.bucket.as_str(),
            field: v.field.as_str(),
            node: v.node.as_str(),
            reduction: v.reduction(),
        }
    }
}

/// Body of `POST /relay`.
#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    /// Configured device id.
    pub id: String,
    /// Desired relay state.
    pub on: bool,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
