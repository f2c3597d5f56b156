//! Core types for billing-dispatch

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Unique identifier for a task, assigned in submission order
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a submitted batch
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl From<u64> for BatchId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice status understood by the invoicing collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum InvoiceStatus {
    /// Not yet paid
    #[serde(rename = "pendiente")]
    Pending,
    /// Paid
    #[serde(rename = "pagado")]
    Paid,
}

/// One invoice to create, shaped after the invoicing collaborator's contract
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceDraft {
    /// Resident the invoice is issued to
    #[serde(rename = "residenteId")]
    pub resident_id: String,

    /// Payment the invoice refers to
    #[serde(rename = "pagoId")]
    pub payment_id: String,

    /// Housing unit identifier
    #[serde(rename = "unidad")]
    pub unit: String,

    /// Billing concept
    #[serde(rename = "concepto")]
    pub concept: String,

    /// Amount, strictly positive
    #[serde(rename = "monto")]
    pub amount: f64,

    /// Issue date (ISO-8601 date or date-time)
    #[serde(rename = "fechaEmision")]
    pub issued_at: String,

    /// Payment date (ISO-8601), if already paid
    #[serde(rename = "fechaPago", default)]
    pub paid_at: Option<String>,

    /// Invoice status
    #[serde(rename = "estado")]
    pub status: InvoiceStatus,
}

impl InvoiceDraft {
    /// Check the field-level rules of the invoicing contract.
    ///
    /// Returns every problem found, each prefixed with the field name.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (field, value) in [
            ("residenteId", &self.resident_id),
            ("pagoId", &self.payment_id),
            ("unidad", &self.unit),
            ("concepto", &self.concept),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{field}: must not be empty"));
            }
        }

        if !self.amount.is_finite() || self.amount <= 0.0 {
            problems.push("monto: must be greater than 0".to_string());
        }

        if !is_iso_date(&self.issued_at) {
            problems.push("fechaEmision: must be an ISO-8601 date".to_string());
        }

        if let Some(paid_at) = &self.paid_at
            && !is_iso_date(paid_at)
        {
            problems.push("fechaPago: must be an ISO-8601 date".to_string());
        }

        problems
    }

    /// Parse a batch from raw JSON, rejecting the whole batch if it is not a
    /// non-empty array of well-formed drafts
    pub fn batch_from_json(value: &serde_json::Value) -> Result<Vec<InvoiceDraft>> {
        let items = value.as_array().ok_or_else(|| Error::InvalidBatch {
            message: "residents must be an array".to_string(),
            details: vec![],
        })?;

        let mut drafts = Vec::with_capacity(items.len());
        let mut details = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value::<InvoiceDraft>(item.clone()) {
                Ok(draft) => drafts.push(draft),
                Err(e) => details.push(format!("residents[{index}]: {e}")),
            }
        }

        if !details.is_empty() {
            return Err(Error::InvalidBatch {
                message: format!("{} of {} drafts are malformed", details.len(), items.len()),
                details,
            });
        }

        validate_batch(&drafts)?;
        Ok(drafts)
    }
}

/// Reject an empty batch or one containing any draft that breaks the contract
pub fn validate_batch(drafts: &[InvoiceDraft]) -> Result<()> {
    if drafts.is_empty() {
        return Err(Error::InvalidBatch {
            message: "batch is empty".to_string(),
            details: vec![],
        });
    }

    let details: Vec<String> = drafts
        .iter()
        .enumerate()
        .flat_map(|(index, draft)| {
            draft
                .problems()
                .into_iter()
                .map(move |problem| format!("residents[{index}].{problem}"))
        })
        .collect();

    if details.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidBatch {
            message: format!("{} problems in {} drafts", details.len(), drafts.len()),
            details,
        })
    }
}

fn is_iso_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Authorization header value supplied by the submitter.
///
/// The full header value (including the `Bearer ` scheme) is kept and forwarded
/// to the invoicing collaborator untouched. Verification is left to the auth service.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Accept an `Authorization` header value if it carries a non-empty bearer token
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(Self(value.trim().to_string()))
        } else {
            None
        }
    }

    /// Header value to forward verbatim
    pub fn header_value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// One pending-or-running unit of work
#[derive(Clone, Debug)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Batch the task was submitted in
    pub batch_id: BatchId,
    /// Invoice to create
    pub draft: InvoiceDraft,
    /// Launch number, starting at 1 and bumped on each requeue
    pub attempt: u32,
    /// Launches allowed before the task is logged as a permanent failure
    pub max_attempts: u32,
    /// Credential forwarded to the invoicing collaborator
    pub credential: BearerToken,
}

impl Task {
    /// Whether a failed launch may go back on the queue
    pub fn can_requeue(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Result of running one task in an execution unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Invoice created
    Success {
        /// Identifier assigned by the invoicing collaborator
        invoice_id: String,
    },
    /// Transient failure, eligible for requeue
    RetryableFailure {
        /// Last error seen
        reason: String,
    },
    /// Failure that must not be retried
    PermanentFailure {
        /// Why the task failed
        reason: String,
    },
}

/// Line written to the failure log for each permanently failed task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailureRecord {
    /// Resident the failed invoice was for
    #[serde(rename = "id")]
    pub resident_id: String,

    /// Failure reason
    #[serde(rename = "error")]
    pub reason: String,

    /// When the failure was recorded (ISO-8601, millisecond precision)
    #[serde(rename = "fecha", serialize_with = "serialize_millis")]
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Record a failure for `resident_id` at the current time
    pub fn new(resident_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resident_id: resident_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

fn serialize_millis<S>(timestamp: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Acknowledgment returned when a batch is accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchAccepted {
    /// Batch identifier
    pub batch_id: BatchId,
    /// Number of tasks enqueued
    pub accepted: usize,
}

/// Point-in-time view of the dispatcher
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DispatcherStats {
    /// Concurrency cap
    pub max_concurrent: usize,
    /// Execution units currently running
    pub active: usize,
    /// Tasks waiting in the queue
    pub pending: usize,
    /// Freed slots still in their cooldown
    pub cooling_slots: usize,
    /// Tasks submitted since start
    pub submitted: u64,
    /// Tasks that produced an invoice
    pub succeeded: u64,
    /// Requeues performed
    pub requeued: u64,
    /// Tasks that ended as permanent failures
    pub failed: u64,
    /// Whether new batches are accepted
    pub accepting_new: bool,
}

/// Event emitted during a task's lifecycle
///
/// These are per-task notifications. There is no batch completion event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch accepted and enqueued
    BatchAccepted {
        /// Batch identifier
        batch_id: BatchId,
        /// Number of tasks enqueued
        accepted: usize,
    },

    /// Execution unit launched for a task
    TaskStarted {
        /// Task identifier
        task_id: TaskId,
        /// Resident the invoice is for
        resident_id: String,
        /// Launch number
        attempt: u32,
    },

    /// Invoice created
    InvoiceCreated {
        /// Task identifier
        task_id: TaskId,
        /// Resident the invoice is for
        resident_id: String,
        /// Identifier assigned by the invoicing collaborator
        invoice_id: String,
    },

    /// Task pushed to the back of the queue after a failed launch
    TaskRequeued {
        /// Task identifier
        task_id: TaskId,
        /// Resident the invoice is for
        resident_id: String,
        /// Launch number the task will run with next
        next_attempt: u32,
        /// Why the previous launch failed
        reason: String,
    },

    /// Task gave up
    TaskFailed {
        /// Task identifier
        task_id: TaskId,
        /// Resident the invoice is for
        resident_id: String,
        /// Final failure reason
        reason: String,
        /// Whether the failure log accepted the record
        logged: bool,
    },
}
