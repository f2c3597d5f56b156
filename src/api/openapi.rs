//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the billing-dispatch REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the billing-dispatch REST API
///
/// The spec is served at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "billing-dispatch REST API",
        version = "0.1.0",
        description = "Bounded dispatcher for bulk invoice generation. Batches are accepted immediately and processed in the background under a global concurrency cap.",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3006", description = "Local development server")
    ),
    paths(
        // Invoices
        crate::api::routes::generate_invoices,

        // Queue
        crate::api::routes::queue_stats,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::InvoiceDraft,
        crate::types::InvoiceStatus,
        crate::types::BatchId,
        crate::types::TaskId,
        crate::types::BatchAccepted,
        crate::types::DispatcherStats,
        crate::types::Event,
        crate::types::FailureRecord,

        // API request/response types from routes
        crate::api::routes::GenerateInvoicesRequest,
        crate::api::routes::GenerateInvoicesResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "invoices", description = "Invoice generation - Submit batches of invoice drafts"),
        (name = "queue", description = "Dispatcher queue - Concurrency, backlog and outcome counters"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the bearer authentication scheme required by `POST /generate-invoices`
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_has_every_route() {
        let spec = ApiDoc::openapi();

        for path in [
            "/generate-invoices",
            "/queue/stats",
            "/health",
            "/openapi.json",
            "/events",
        ] {
            assert!(
                spec.paths.paths.contains_key(path),
                "OpenAPI spec should document {path}"
            );
        }
    }

    #[test]
    fn test_openapi_spec_has_components() {
        let spec = ApiDoc::openapi();

        let components = spec.components.expect("components should be defined");
        for schema in [
            "InvoiceDraft",
            "DispatcherStats",
            "GenerateInvoicesRequest",
            "ApiError",
        ] {
            assert!(
                components.schemas.contains_key(schema),
                "missing schema {schema}"
            );
        }
    }

    #[test]
    fn test_openapi_spec_has_tags() {
        let spec = ApiDoc::openapi();

        let tags = spec.tags.expect("tags should be defined");
        let tag_names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tag_names, vec!["invoices", "queue", "system"]);
    }

    #[test]
    fn test_openapi_spec_info() {
        let spec = ApiDoc::openapi();

        assert_eq!(spec.info.title, "billing-dispatch REST API");
        assert_eq!(spec.info.version, "0.1.0");
        assert!(spec.info.description.is_some());
    }

    #[test]
    fn test_openapi_spec_has_bearer_scheme() {
        let spec = ApiDoc::openapi();

        let components = spec.components.unwrap();
        assert!(
            components.security_schemes.contains_key("bearer_auth"),
            "Should have 'bearer_auth' security scheme defined"
        );
    }

    #[test]
    fn test_openapi_json_serialization() {
        let spec = ApiDoc::openapi();

        let json = serde_json::to_string(&spec).expect("Should serialize to JSON");
        let value: serde_json::Value =
            serde_json::from_str(&json).expect("Generated JSON should be valid");
        assert!(value["openapi"].as_str().unwrap().starts_with("3."));
    }
}
