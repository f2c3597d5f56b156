//! Execution units, one invoicing attempt cycle per launch.
//!
//! Each unit runs as its own Tokio task. A supervisor task awaits it and turns
//! whatever happened (clean outcome, panic, cancellation) into a report for
//! the actor, so a faulting unit never reaches dispatcher state.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::actor::Command;
use crate::invoicing::InvoicingClient;
use crate::retry::{IsRetryable, RetryPolicy, with_retry};
use crate::types::{Outcome, Task};

/// What a supervisor tells the actor about a finished unit
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UnitReport {
    /// The unit returned a classified outcome
    Completed(Outcome),
    /// The unit panicked or was cancelled before returning
    Faulted(String),
}

/// Run one task: call the invoicing collaborator, retrying transient failures
/// in place with linear backoff.
pub(crate) async fn run(task: &Task, client: &dyn InvoicingClient, policy: &RetryPolicy) -> Outcome {
    let draft = &task.draft;
    let credential = &task.credential;

    match with_retry(policy, move |_| client.create_invoice(draft, credential)).await {
        Ok(invoice_id) => Outcome::Success { invoice_id },
        Err(e) if e.is_retryable() => Outcome::RetryableFailure {
            reason: e.to_string(),
        },
        Err(e) => Outcome::PermanentFailure {
            reason: e.to_string(),
        },
    }
}

/// Spawn a supervised execution unit for `task`.
///
/// Exactly one [`Command::UnitFinished`] is sent for the task, whatever the
/// unit does.
pub(crate) fn launch(
    task: Task,
    client: Arc<dyn InvoicingClient>,
    policy: RetryPolicy,
    reports: mpsc::UnboundedSender<Command>,
) {
    let task_id = task.id;
    tokio::spawn(async move {
        let unit = tokio::spawn(async move { run(&task, client.as_ref(), &policy).await });

        let report = match unit.await {
            Ok(outcome) => UnitReport::Completed(outcome),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(task_id = %task_id, panic = %message, "Execution unit panicked");
                UnitReport::Faulted(format!("execution unit fault: {message}"))
            }
            Err(e) => UnitReport::Faulted(format!("execution unit cancelled: {e}")),
        };

        if reports.send(Command::UnitFinished { task_id, report }).is_err() {
            tracing::warn!(task_id = %task_id, "Dispatcher stopped before unit report");
        }
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
