//! Dispatcher queue handlers.

use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};

/// GET /queue/stats - Get dispatcher statistics
#[utoipa::path(
    get,
    path = "/queue/stats",
    tag = "queue",
    responses(
        (status = 200, description = "Dispatcher statistics", body = crate::types::DispatcherStats),
        (status = 503, description = "Dispatcher has stopped", body = crate::error::ApiError)
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> Response {
    match state.dispatcher.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get dispatcher stats");
            e.into_response()
        }
    }
}
