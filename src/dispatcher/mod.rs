//! Bounded task dispatcher split into focused submodules.
//!
//! A single actor task owns the pending queue and the set of running tasks;
//! everything else talks to it over a channel:
//! - [`actor`] - Queue ownership, slot accounting, requeue and failure decisions
//! - [`execution`] - Execution units and the supervisor that contains their faults
//! - [`lifecycle`] - Graceful drain on shutdown

mod actor;
mod execution;
mod lifecycle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::failure_log::FailureLog;
use crate::invoicing::{HttpInvoicingClient, InvoicingClient};
use crate::retry::RetryPolicy;
use crate::types::{BatchAccepted, BatchId, BearerToken, DispatcherStats, Event, InvoiceDraft};
use actor::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Runtime knobs of the dispatcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Maximum execution units running at once
    pub max_concurrent: usize,
    /// Launches a task gets before it is logged as a permanent failure
    pub max_attempts: u32,
    /// Pause between a slot freeing up and it taking the next task
    pub slot_cooldown: Duration,
    /// Intra-unit retry policy
    pub retry: RetryPolicy,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl DispatchSettings {
    /// Reject settings under which queued tasks could never finish
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::config("must be at least 1", "dispatch.max_concurrent"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("must be at least 1", "dispatch.max_attempts"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("must be at least 1", "retry.max_attempts"));
        }
        Ok(())
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent: config.dispatch.max_concurrent,
            max_attempts: config.dispatch.max_attempts,
            slot_cooldown: config.dispatch.slot_cooldown,
            retry: RetryPolicy::from(&config.retry),
            event_buffer: config.dispatch.event_buffer,
        }
    }
}

/// Handle to a running dispatcher (cloneable, all clones drive the same actor)
#[derive(Clone)]
pub struct Dispatcher {
    /// Commands to the actor
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Set to false once shutdown starts
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Held while checking `accepting_new` and enqueueing a batch, so the
    /// actor cannot stop between the two
    pub(crate) intake: Arc<Mutex<()>>,
    next_batch_id: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Start the dispatcher actor.
    ///
    /// The actor runs until [`Dispatcher::shutdown`] has drained it.
    /// Fails with [`Error::Config`] if `settings` would leave tasks pending forever.
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        settings: DispatchSettings,
        client: Arc<dyn InvoicingClient>,
        failure_log: FailureLog,
    ) -> Result<Self> {
        settings.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _rx) = broadcast::channel(settings.event_buffer.max(1));
        let accepting_new = Arc::new(AtomicBool::new(true));
        let intake = Arc::new(Mutex::new(()));

        tracing::info!(
            max_concurrent = settings.max_concurrent,
            max_attempts = settings.max_attempts,
            slot_cooldown_ms = settings.slot_cooldown.as_millis() as u64,
            failure_log = %failure_log.path().display(),
            "Starting dispatcher"
        );

        let actor = actor::Actor::new(
            settings,
            client,
            failure_log,
            cmd_tx.clone(),
            event_tx.clone(),
            accepting_new.clone(),
            intake.clone(),
        );
        tokio::spawn(actor.run(cmd_rx));

        Ok(Self {
            cmd_tx,
            event_tx,
            accepting_new,
            intake,
            next_batch_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Start a dispatcher wired to the HTTP invoicing client and the
    /// configured failure log
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = HttpInvoicingClient::new(&config.invoicing)?;
        let failure_log = FailureLog::open(config.failure_log.path.clone());
        Self::spawn(
            DispatchSettings::from(config),
            Arc::new(client),
            failure_log,
        )
    }

    /// Enqueue a batch of drafts.
    ///
    /// Validation is synchronous: an empty batch or any malformed draft rejects
    /// the whole batch with [`Error::InvalidBatch`]. Once accepted, the call
    /// returns without waiting for any task; outcomes are only visible through
    /// [`Dispatcher::subscribe`], [`Dispatcher::stats`] and the failure log.
    ///
    /// Slots still cooling down after earlier tasks count against the cap, so
    /// on a busy dispatcher the first launch can wait up to `slot_cooldown`.
    pub fn submit(
        &self,
        drafts: Vec<InvoiceDraft>,
        credential: BearerToken,
    ) -> Result<BatchAccepted> {
        let _intake = lock_intake(&self.intake);
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        crate::types::validate_batch(&drafts)?;

        let batch_id = BatchId(self.next_batch_id.fetch_add(1, Ordering::SeqCst));
        let accepted = drafts.len();
        self.cmd_tx
            .send(Command::Submit {
                batch_id,
                drafts,
                credential,
            })
            .map_err(|_| Error::DispatcherUnavailable)?;

        Ok(BatchAccepted { batch_id, accepted })
    }

    /// Subscribe to task lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Snapshot of queue and slot state
    pub async fn stats(&self) -> Result<DispatcherStats> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stats(reply))
            .map_err(|_| Error::DispatcherUnavailable)?;
        rx.await.map_err(|_| Error::DispatcherUnavailable)
    }

    /// Whether new batches are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}

/// The lock guards no data, so a poisoned one is still usable
pub(crate) fn lock_intake(intake: &Mutex<()>) -> MutexGuard<'_, ()> {
    intake.lock().unwrap_or_else(PoisonError::into_inner)
}
