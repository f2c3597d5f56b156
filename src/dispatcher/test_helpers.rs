//! Shared test helpers: scripted invoicing clients and dispatcher setup.

use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::error::{Error, Result};
use crate::failure_log::FailureLog;
use crate::invoicing::InvoicingClient;
use crate::retry::RetryPolicy;
use crate::types::{BearerToken, DispatcherStats, Event, FailureRecord, InvoiceDraft, InvoiceStatus};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};

/// One scripted response of [`ScriptedClient`]
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// 201 with this invoice id
    Created(&'static str),
    /// Non-201 status
    Status(u16),
    /// Request timed out
    Timeout,
    /// Non-retryable error
    Fatal,
    /// The call panics
    Panic,
}

/// Fake invoicing collaborator.
///
/// Residents without a script (or whose script ran out) succeed with
/// `inv-<resident>`. Tracks call order, successes and peak concurrency.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue responses for `resident`
    pub(crate) fn script(self, resident: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(resident.to_string(), steps.into());
        self
    }

    /// Make every call take `latency`
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call consume one permit of `gate` before answering
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls_for(&self, resident: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == resident)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Residents in the order their invoices were created
    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvoicingClient for ScriptedClient {
    async fn create_invoice(&self, draft: &InvoiceDraft, _credential: &BearerToken) -> Result<String> {
        let resident = draft.resident_id.clone();
        self.calls.lock().unwrap().push(resident.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&resident)
            .and_then(|steps| steps.pop_front());

        match step {
            None => {
                self.created.lock().unwrap().push(resident.clone());
                Ok(format!("inv-{resident}"))
            }
            Some(Step::Created(id)) => {
                self.created.lock().unwrap().push(resident);
                Ok(id.to_string())
            }
            Some(Step::Status(status)) => Err(Error::UnexpectedStatus {
                status,
                body: "scripted".into(),
            }),
            Some(Step::Timeout) => Err(Error::Timeout {
                timeout: Duration::from_secs(5),
            }),
            Some(Step::Fatal) => Err(Error::Other("scripted rejection".into())),
            Some(Step::Panic) => panic!("scripted panic for {resident}"),
        }
    }
}

pub(crate) fn draft(resident: &str) -> InvoiceDraft {
    InvoiceDraft {
        resident_id: resident.to_string(),
        payment_id: format!("pay-{resident}"),
        unit: "A-101".into(),
        concept: "Cuota de mantenimiento".into(),
        amount: 1500.0,
        issued_at: "2024-03-01".into(),
        paid_at: None,
        status: InvoiceStatus::Pending,
    }
}

pub(crate) fn drafts(residents: &[&str]) -> Vec<InvoiceDraft> {
    residents.iter().map(|r| draft(r)).collect()
}

pub(crate) fn token() -> BearerToken {
    BearerToken::from_header("Bearer test-token").unwrap()
}

/// Settings with short delays so tests run fast
pub(crate) fn fast_settings(max_concurrent: usize) -> DispatchSettings {
    DispatchSettings {
        max_concurrent,
        max_attempts: 3,
        slot_cooldown: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        event_buffer: 1000,
    }
}

/// Dispatcher over `client` logging to a temp file.
/// Returns the tempdir, which must be kept alive.
pub(crate) fn spawn_dispatcher(
    settings: DispatchSettings,
    client: Arc<ScriptedClient>,
) -> (Dispatcher, PathBuf, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let log_path = temp_dir.path().join("failures.log");
    let dispatcher =
        Dispatcher::spawn(settings, client, FailureLog::open(log_path.clone())).unwrap();
    (dispatcher, log_path, temp_dir)
}

/// Records in the failure log (empty if it was never created)
pub(crate) fn read_failures(path: &Path) -> Vec<FailureRecord> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect(),
        Err(_) => vec![],
    }
}

/// Poll stats until `check` passes, panicking after 5 seconds
pub(crate) async fn wait_for_stats(
    dispatcher: &Dispatcher,
    check: impl Fn(&DispatcherStats) -> bool,
) -> DispatcherStats {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = dispatcher.stats().await.unwrap();
        if check(&stats) {
            return stats;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for stats, last: {stats:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Everything currently buffered on `rx`
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
