//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{ErrorResponse, RelayRequest, SeriesResponse, ViewEcho};
use crate::error::RelayError;
use crate::monitor::{RelayOutcome, ViewState};
use crate::relay::{NewSchedule, RelayReceipt, ScheduleEntry};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn relay_error(e: RelayError) -> ApiError {
    let status = match &e {
        RelayError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        RelayError::MissingField(_) => StatusCode::BAD_REQUEST,
        RelayError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::Transport { .. } | RelayError::Status { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorResponse::new(e)))
}

/// Returns the latest snapshot.
///
/// `GET /state` → 200 + snapshot JSON, or 503 before the first cycle
pub async fn get_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let shared = state.monitor.shared();
    let guard = shared.read().await;
    let Some(snapshot) = guard.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("no refresh cycle has completed yet")),
        ));
    };
    serde_json::to_value(snapshot)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(e))))
}

/// Aggregates the selected series from the latest table.
///
/// `GET /series?field=energy&bucket=day&node=main&reduction=sum` → 200 +
/// `SeriesResponse`. Missing parameters fall back to the default view; no
/// data yields an empty `points` array.
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Query(view): Query<ViewState>,
) -> Json<SeriesResponse> {
    let shared = state.monitor.shared();
    let guard = shared.read().await;
    let points = guard
        .as_ref()
        .and_then(|s| s.table.as_ref())
        .map(|t| view.series(t))
        .unwrap_or_default();
    Json(SeriesResponse {
        title: view.title(),
        unit: view.field.unit(),
        view: ViewEcho::from(&view),
        points,
    })
}

/// `GET /schedule` → 200 + schedule entries (empty when unavailable)
pub async fn get_schedule(State(state): State<Arc<AppState>>) -> Json<Vec<ScheduleEntry>> {
    Json(state.monitor.schedules().await)
}

/// `POST /schedule` with a `NewSchedule` body → 200 + receipt
pub async fn add_schedule(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<NewSchedule>,
) -> Result<Json<RelayReceipt>, ApiError> {
    state
        .monitor
        .relay()
        .add_schedule(&entry)
        .await
        .map(Json)
        .map_err(relay_error)
}

/// `DELETE /schedule/{id}` → 200 + receipt
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RelayReceipt>, ApiError> {
    state
        .monitor
        .relay()
        .delete_schedule(&id)
        .await
        .map(Json)
        .map_err(relay_error)
}

/// Switches a relay and reports whether the readings confirm it.
///
/// `POST /relay` with `{"id": "relay_1", "on": false}` → 200 +
/// `RelayOutcome`; 404 for an unknown device, 502 when the webhook fails.
pub async fn post_relay(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayOutcome>, ApiError> {
    state
        .monitor
        .switch_relay(&req.id, req.on)
        .await
        .map(Json)
        .map_err(relay_error)
}
