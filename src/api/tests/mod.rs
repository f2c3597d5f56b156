use super::*;
use crate::Config;
use crate::dispatcher::test_helpers::{
    ScriptedClient, Step, fast_settings, read_failures, spawn_dispatcher, wait_for_stats,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tower::ServiceExt; // for oneshot()

mod queue;

/// Router over a dispatcher backed by `client`.
/// The tempdir holds the failure log and must be kept alive.
fn test_app(client: Arc<ScriptedClient>) -> (Router, Dispatcher, PathBuf, tempfile::TempDir) {
    let (dispatcher, log_path, temp_dir) = spawn_dispatcher(fast_settings(3), client);
    let app = create_router(dispatcher.clone(), Arc::new(Config::default()));
    (app, dispatcher, log_path, temp_dir)
}

fn draft_json(resident: &str) -> Value {
    json!({
        "residenteId": resident,
        "pagoId": format!("pay-{resident}"),
        "unidad": "B-204",
        "concepto": "Cuota de mantenimiento",
        "monto": 1200.5,
        "fechaEmision": "2024-05-01",
        "estado": "pendiente"
    })
}

fn generate_request(body: &Value, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/generate-invoices")
        .header("content-type", "application/json");
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_serve_stops_on_cancellation() {
    let (dispatcher, _log_path, _temp_dir) =
        spawn_dispatcher(fast_settings(3), Arc::new(ScriptedClient::new()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(serve(
        listener,
        dispatcher,
        Arc::new(Config::default()),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_start_api_server_reports_bind_failure() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (dispatcher, _log_path, _temp_dir) =
        spawn_dispatcher(fast_settings(3), Arc::new(ScriptedClient::new()));

    let mut config = Config::default();
    config.server.api.bind_address = occupied.local_addr().unwrap();

    let result = start_api_server(dispatcher, Arc::new(config), CancellationToken::new()).await;
    assert!(matches!(result, Err(crate::error::Error::Io(_))));
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _dispatcher, _log_path, _temp_dir) = test_app(Arc::new(ScriptedClient::new()));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (dispatcher, _log_path, _temp_dir) =
        spawn_dispatcher(fast_settings(3), Arc::new(ScriptedClient::new()));
    let mut config = Config::default();
    config.server.api.cors_enabled = false;
    let app = create_router(dispatcher, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should not be present when CORS is disabled"
    );
}

#[tokio::test]
async fn test_cors_specific_origins() {
    let (dispatcher, _log_path, _temp_dir) =
        spawn_dispatcher(fast_settings(3), Arc::new(ScriptedClient::new()));
    let mut config = Config::default();
    config.server.api.cors_origins = vec!["https://admin.example.com".to_string()];
    let app = create_router(dispatcher, Arc::new(config));

    let allowed = Request::builder()
        .uri("/health")
        .header("Origin", "https://admin.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(allowed).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://admin.example.com")
    );

    let other = Request::builder()
        .uri("/health")
        .header("Origin", "https://elsewhere.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(other).await.unwrap();
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}
