//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`invoices`] - Batch submission
//! - [`queue`] - Dispatcher statistics
//! - [`system`] - Health, events, OpenAPI

use crate::types::BatchId;
use serde::{Deserialize, Serialize};

mod invoices;
mod queue;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use invoices::*;
pub use queue::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /generate-invoices
///
/// `residents` is kept as raw JSON so a malformed item rejects the batch with a
/// per-item message instead of a generic body error.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct GenerateInvoicesRequest {
    /// Invoice drafts to generate, one per resident
    #[serde(default, alias = "residentes")]
    #[schema(value_type = Vec<crate::types::InvoiceDraft>)]
    pub residents: serde_json::Value,
}

/// Response body for an accepted batch
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct GenerateInvoicesResponse {
    /// Identifier of the accepted batch
    pub batch_id: BatchId,
    /// Number of invoices queued
    pub accepted: usize,
    /// Human-readable acknowledgment
    pub message: String,
}
