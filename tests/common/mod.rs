//! Common test utilities for billing-dispatch integration tests

#![allow(dead_code)]

use billing_dispatch::{Config, Dispatcher, DispatcherStats, FailureRecord};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Header every test submission carries
pub const AUTHORIZATION: &str = "Bearer integration-token";

/// Config pointed at `server` with short delays, logging failures under `temp_dir`
pub fn config_for(server: &MockServer, temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.invoicing.url = format!("{}/invoices", server.uri());
    config.invoicing.request_timeout = Duration::from_millis(500);
    config.retry.base_delay = Duration::from_millis(5);
    config.dispatch.slot_cooldown = Duration::from_millis(20);
    config.failure_log.path = temp_dir.path().join("failures.log");
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// Draft in the invoicing service's wire format
pub fn draft_json(resident: &str) -> Value {
    json!({
        "residenteId": resident,
        "pagoId": format!("pay-{resident}"),
        "unidad": "C-310",
        "concepto": "Cuota de mantenimiento",
        "monto": 980.0,
        "fechaEmision": "2024-06-01T09:30:00Z",
        "fechaPago": null,
        "estado": "pendiente"
    })
}

pub fn residents(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("res-{i:02}")).collect()
}

/// Records in the failure log (empty if it was never created)
pub fn read_failures(path: &Path) -> Vec<FailureRecord> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect(),
        Err(_) => vec![],
    }
}

/// Poll stats until `check` passes, recording the highest `active` seen.
/// Panics after `timeout`.
pub async fn wait_for_stats(
    dispatcher: &Dispatcher,
    timeout: Duration,
    check: impl Fn(&DispatcherStats) -> bool,
) -> (DispatcherStats, usize) {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut peak_active = 0;
    loop {
        let stats = dispatcher.stats().await.unwrap();
        peak_active = peak_active.max(stats.active);
        if check(&stats) {
            return (stats, peak_active);
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for stats, last: {stats:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
