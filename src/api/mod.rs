//! REST API over the monitor.
//!
//! - `GET /state`: latest snapshot (summary, advisory, clean report)
//! - `GET /series`: aggregated series for a view selection
//! - `GET /schedule`, `POST /schedule`, `DELETE /schedule/{id}`: schedules
//! - `POST /relay`: manual relay switch with settle-and-verify

mod handlers;
mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tracing::info;

use crate::monitor::Monitor;

pub use types::{ErrorResponse, RelayRequest, SeriesResponse};

/// State shared across request handlers.
///
/// The snapshot inside the monitor is refreshed by the polling loop; the
/// handlers only take read locks on it.
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/series", get(handlers::get_series))
        .route(
            "/schedule",
            get(handlers::get_schedule).post(handlers::add_schedule),
        )
        .route("/schedule/{id}", delete(handlers::delete_schedule))
        .route("/relay", post(handlers::post_relay))
        .with_state(state)
}

/// Binds to `addr` and serves the API until `shutdown` resolves.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
