//! # billing-dispatch
//!
//! Bounded task dispatcher for bulk invoice generation.
//!
//! A batch of invoice drafts is accepted in one call and fanned out to an
//! external invoicing service under a global concurrency cap. Each task gets
//! a few quick retries inside its execution unit; if those are exhausted the
//! task goes back to the end of the queue. Tasks that still fail are written
//! to an append-only failure log.
//!
//! ## Quick Start
//!
//! ```no_run
//! use billing_dispatch::{BearerToken, Config, Dispatcher, InvoiceDraft, InvoiceStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::from_config(&Config::default())?;
//!
//!     // Subscribe to per-task events
//!     let mut events = dispatcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let draft = InvoiceDraft {
//!         resident_id: "res-1".into(),
//!         payment_id: "pay-1".into(),
//!         unit: "A-101".into(),
//!         concept: "Cuota de mantenimiento".into(),
//!         amount: 1500.0,
//!         issued_at: "2024-03-01".into(),
//!         paid_at: None,
//!         status: InvoiceStatus::Pending,
//!     };
//!     let credential = BearerToken::from_header("Bearer abc123").ok_or("bad token")?;
//!
//!     let accepted = dispatcher.submit(vec![draft], credential)?;
//!     println!("batch {} queued {} invoices", accepted.batch_id, accepted.accepted);
//!
//!     dispatcher.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Bounded dispatcher (decomposed into focused submodules)
pub mod dispatcher;
/// Error types
pub mod error;
/// Append-only log of permanently failed tasks
pub mod failure_log;
/// Client for the external invoicing service
pub mod invoicing;
/// Retry logic with linear backoff
pub mod retry;
/// Logging setup
pub mod telemetry;
/// Core types and events
pub mod types;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use failure_log::FailureLog;
pub use invoicing::{HttpInvoicingClient, InvoicingClient};
pub use retry::RetryPolicy;
pub use types::{
    BatchAccepted, BatchId, BearerToken, DispatcherStats, Event, FailureRecord, InvoiceDraft,
    InvoiceStatus, Outcome, Task, TaskId,
};

/// Serve the API and run the dispatcher until a termination signal arrives.
///
/// On signal the API server stops taking requests first, then the dispatcher
/// drains every pending and running task before this returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use billing_dispatch::{Config, Dispatcher, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(Config::default());
///     let dispatcher = Dispatcher::from_config(&config)?;
///
///     run_with_shutdown(dispatcher, config).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(dispatcher: Dispatcher, config: Arc<Config>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(api::start_api_server(
        dispatcher.clone(),
        config,
        shutdown.clone(),
    ));

    let served = tokio::select! {
        _ = wait_for_signal() => {
            shutdown.cancel();
            flatten(server.await)
        }
        joined = &mut server => {
            tracing::error!("API server exited before a shutdown signal");
            flatten(joined)
        }
    };

    tracing::info!("Draining dispatcher");
    dispatcher.shutdown().await?;
    served
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::ApiServerError(e.to_string()))?
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
