//! Invoice batch submission handler.

use super::{GenerateInvoicesRequest, GenerateInvoicesResponse};
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::{BearerToken, InvoiceDraft};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /generate-invoices - Submit a batch of invoice drafts
///
/// The batch is accepted as a whole or rejected as a whole. Accepted batches
/// are processed in the background; the response does not wait for invoices.
#[utoipa::path(
    post,
    path = "/generate-invoices",
    tag = "invoices",
    request_body = GenerateInvoicesRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Batch accepted for processing", body = GenerateInvoicesResponse),
        (status = 400, description = "Malformed body or invalid drafts", body = ApiError),
        (status = 401, description = "Missing or non-bearer Authorization header", body = ApiError),
        (status = 503, description = "Dispatcher is shutting down", body = ApiError)
    )
)]
pub async fn generate_invoices(
    State(state): State<AppState>,
    Extension(credential): Extension<BearerToken>,
    payload: Result<Json<GenerateInvoicesRequest>, JsonRejection>,
) -> Response {
    if !state.dispatcher.is_accepting() {
        return Error::ShuttingDown.into_response();
    }

    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected malformed request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::validation(rejection.body_text())),
            )
                .into_response();
        }
    };

    let result = InvoiceDraft::batch_from_json(&request.residents)
        .and_then(|drafts| state.dispatcher.submit(drafts, credential));

    match result {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(GenerateInvoicesResponse {
                batch_id: accepted.batch_id,
                accepted: accepted.accepted,
                message: format!("{} invoices queued for generation", accepted.accepted),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
