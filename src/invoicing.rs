//! Client for the invoicing collaborator
//!
//! Execution units talk to the invoicing service through [`InvoicingClient`],
//! so tests can swap in scripted implementations.

use crate::config::InvoicingConfig;
use crate::error::{Error, Result};
use crate::types::{BearerToken, InvoiceDraft};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Invoice id used when a 201 response carries no identifier
pub const UNKNOWN_INVOICE_ID: &str = "unknown";

const MAX_ERROR_BODY: usize = 512;

/// Creates invoices at the invoicing collaborator
#[async_trait]
pub trait InvoicingClient: Send + Sync {
    /// Create one invoice, forwarding `credential` as the Authorization header.
    ///
    /// Returns the invoice identifier on 201 Created. Every other outcome is an
    /// error; see [`crate::retry::IsRetryable`] for which ones are transient.
    async fn create_invoice(&self, draft: &InvoiceDraft, credential: &BearerToken)
    -> Result<String>;
}

/// [`InvoicingClient`] speaking HTTP via reqwest
#[derive(Clone, Debug)]
pub struct HttpInvoicingClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpInvoicingClient {
    /// Build a client for the configured endpoint
    pub fn new(config: &InvoicingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl InvoicingClient for HttpInvoicingClient {
    async fn create_invoice(
        &self,
        draft: &InvoiceDraft,
        credential: &BearerToken,
    ) -> Result<String> {
        let request = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, credential.header_value())
            .json(draft);

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(Error::Timeout {
                    timeout: self.timeout,
                });
            }
            Ok(Err(e)) => return Err(Error::Network(e)),
            Err(_) => {
                return Err(Error::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        // A malformed body still means the invoice exists
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(extract_invoice_id(&body))
    }
}

/// Pull the invoice id out of a 201 body.
///
/// Looks at `id` first, then `nueva.id`, the shape the invoicing service
/// returns today. Numeric ids are stringified.
pub fn extract_invoice_id(body: &serde_json::Value) -> String {
    [&body["id"], &body["nueva"]["id"]]
        .into_iter()
        .find_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_INVOICE_ID.to_string())
}
