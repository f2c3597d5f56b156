//! Authentication middleware for the REST API
//!
//! Invoice submission requires an `Authorization: Bearer <token>` header.
//! The token is not verified here; it is forwarded verbatim to the invoicing
//! service, which is the authority on whether it is valid.

use crate::error::ApiError;
use crate::types::BearerToken;
use axum::{
    Json,
    extract::Request,
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Middleware that requires a bearer credential and hands it to the handler
///
/// On success the parsed [`BearerToken`] is inserted into the request
/// extensions, so handlers can take it with `Extension<BearerToken>`.
///
/// # Returns
///
/// Returns either:
/// - 401 Unauthorized if the header is missing, not UTF-8, or not a bearer token
/// - The response from the next handler otherwise
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware, routing::post};
/// use billing_dispatch::api::auth::require_bearer;
///
/// async fn handler() {}
///
/// let router: Router = Router::new()
///     .route("/generate-invoices", post(handler))
///     .layer(middleware::from_fn(require_bearer));
/// ```
pub async fn require_bearer(mut request: Request, next: Next) -> Response {
    let token = match request.headers().get(AUTHORIZATION).map(|value| value.to_str()) {
        Some(Ok(value)) => BearerToken::from_header(value)
            .ok_or("Authorization header must carry a bearer token"),
        Some(Err(_)) => Err("Authorization header is not valid UTF-8"),
        None => Err("Missing Authorization header"),
    };

    match token {
        Ok(token) => {
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Err(message) => unauthorized_response(message),
    }
}

fn unauthorized_response(message: &str) -> Response {
    tracing::debug!(reason = message, "Rejected unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::unauthorized(message)),
    )
        .into_response()
}
