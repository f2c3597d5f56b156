//! Dispatcher actor: sole owner of the pending queue and the running set.
//!
//! Slot accounting: a slot is either running a task, cooling down after its
//! task finished, or free. Tasks are only launched into free slots, so
//! `running + cooling <= max_concurrent` holds at all times.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot};

use super::{DispatchSettings, lock_intake};
use super::execution::{self, UnitReport};
use crate::failure_log::FailureLog;
use crate::invoicing::InvoicingClient;
use crate::types::{
    BatchId, BearerToken, DispatcherStats, Event, FailureRecord, InvoiceDraft, Outcome, Task,
    TaskId,
};

/// Messages handled by the actor loop
#[derive(Debug)]
pub(crate) enum Command {
    /// Enqueue an already validated batch
    Submit {
        batch_id: BatchId,
        drafts: Vec<InvoiceDraft>,
        credential: BearerToken,
    },
    /// An execution unit finished (cleanly or not)
    UnitFinished { task_id: TaskId, report: UnitReport },
    /// A freed slot finished its cooldown
    SlotReady,
    /// The failure log write for a permanently failed task completed
    FailureRecorded {
        task_id: TaskId,
        resident_id: String,
        reason: String,
        logged: bool,
    },
    /// Report current stats
    Stats(oneshot::Sender<DispatcherStats>),
    /// Reply once everything submitted so far has reached a terminal state
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    submitted: u64,
    succeeded: u64,
    requeued: u64,
    failed: u64,
}

pub(crate) struct Actor {
    settings: DispatchSettings,
    client: Arc<dyn InvoicingClient>,
    failure_log: FailureLog,
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<Event>,
    accepting_new: Arc<AtomicBool>,
    intake: Arc<Mutex<()>>,

    pending: VecDeque<Task>,
    running: HashMap<TaskId, Task>,
    cooling: usize,
    /// Failure log writes in flight
    recording: usize,
    next_task_id: u64,
    counters: Counters,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl Actor {
    pub(crate) fn new(
        settings: DispatchSettings,
        client: Arc<dyn InvoicingClient>,
        failure_log: FailureLog,
        cmd_tx: mpsc::UnboundedSender<Command>,
        event_tx: broadcast::Sender<Event>,
        accepting_new: Arc<AtomicBool>,
        intake: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            settings,
            client,
            failure_log,
            cmd_tx,
            event_tx,
            accepting_new,
            intake,
            pending: VecDeque::new(),
            running: HashMap::new(),
            cooling: 0,
            recording: 0,
            next_task_id: 1,
            counters: Counters::default(),
            drain_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        'commands: while let Some(command) = cmd_rx.recv().await {
            self.step(command);

            while !self.drain_waiters.is_empty() && self.is_drained() {
                match self.close_intake(&mut cmd_rx) {
                    Some(command) => self.step(command),
                    None => break 'commands,
                }
            }
        }

        tracing::info!(
            succeeded = self.counters.succeeded,
            failed = self.counters.failed,
            "Dispatcher drained"
        );
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::debug!("Dispatcher actor stopped");
    }

    fn step(&mut self, command: Command) {
        self.handle(command);
        self.fill();
    }

    /// Stop accepting batches and take whatever is still buffered.
    ///
    /// `None` means the channel is empty and no later batch can be accepted,
    /// so the actor may stop.
    fn close_intake(&self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> Option<Command> {
        let _intake = lock_intake(&self.intake);
        self.accepting_new.store(false, Ordering::SeqCst);
        cmd_rx.try_recv().ok()
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit {
                batch_id,
                drafts,
                credential,
            } => self.enqueue(batch_id, drafts, credential),
            Command::UnitFinished { task_id, report } => self.on_unit_finished(task_id, report),
            Command::SlotReady => {
                self.cooling = self.cooling.saturating_sub(1);
            }
            Command::FailureRecorded {
                task_id,
                resident_id,
                reason,
                logged,
            } => {
                self.recording = self.recording.saturating_sub(1);
                self.emit(Event::TaskFailed {
                    task_id,
                    resident_id,
                    reason,
                    logged,
                });
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown(reply) => self.drain_waiters.push(reply),
        }
    }

    fn enqueue(&mut self, batch_id: BatchId, drafts: Vec<InvoiceDraft>, credential: BearerToken) {
        let accepted = drafts.len();
        for draft in drafts {
            let id = TaskId(self.next_task_id);
            self.next_task_id += 1;
            self.pending.push_back(Task {
                id,
                batch_id,
                draft,
                attempt: 1,
                max_attempts: self.settings.max_attempts,
                credential: credential.clone(),
            });
        }
        self.counters.submitted += accepted as u64;

        tracing::info!(
            batch_id = %batch_id,
            accepted,
            pending = self.pending.len(),
            active = self.running.len(),
            "Batch accepted"
        );
        self.emit(Event::BatchAccepted { batch_id, accepted });
    }

    /// Launch queued tasks into every free slot, front of the queue first
    fn fill(&mut self) {
        while self.running.len() + self.cooling < self.settings.max_concurrent {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.launch(task);
        }
    }

    fn launch(&mut self, task: Task) {
        tracing::debug!(
            task_id = %task.id,
            resident_id = %task.draft.resident_id,
            attempt = task.attempt,
            active = self.running.len() + 1,
            "Launching execution unit"
        );
        self.emit(Event::TaskStarted {
            task_id: task.id,
            resident_id: task.draft.resident_id.clone(),
            attempt: task.attempt,
        });

        execution::launch(
            task.clone(),
            self.client.clone(),
            self.settings.retry,
            self.cmd_tx.clone(),
        );
        self.running.insert(task.id, task);
    }

    fn on_unit_finished(&mut self, task_id: TaskId, report: UnitReport) {
        let Some(mut task) = self.running.remove(&task_id) else {
            tracing::warn!(task_id = %task_id, "Report for a task that is not running");
            return;
        };
        self.start_cooldown();

        let reason = match report {
            UnitReport::Completed(Outcome::Success { invoice_id }) => {
                self.counters.succeeded += 1;
                tracing::info!(
                    task_id = %task.id,
                    resident_id = %task.draft.resident_id,
                    invoice_id = %invoice_id,
                    "Invoice created"
                );
                self.emit(Event::InvoiceCreated {
                    task_id: task.id,
                    resident_id: task.draft.resident_id,
                    invoice_id,
                });
                return;
            }
            UnitReport::Completed(Outcome::PermanentFailure { reason }) => {
                self.fail(task, reason);
                return;
            }
            UnitReport::Completed(Outcome::RetryableFailure { reason }) => reason,
            UnitReport::Faulted(reason) => reason,
        };

        if !task.can_requeue() {
            self.fail(task, reason);
            return;
        }

        task.attempt += 1;
        self.counters.requeued += 1;
        tracing::warn!(
            task_id = %task.id,
            resident_id = %task.draft.resident_id,
            next_attempt = task.attempt,
            max_attempts = task.max_attempts,
            reason = %reason,
            "Task requeued"
        );
        self.emit(Event::TaskRequeued {
            task_id: task.id,
            resident_id: task.draft.resident_id.clone(),
            next_attempt: task.attempt,
            reason,
        });
        self.pending.push_back(task);
    }

    fn fail(&mut self, task: Task, reason: String) {
        self.counters.failed += 1;
        self.recording += 1;
        tracing::error!(
            task_id = %task.id,
            resident_id = %task.draft.resident_id,
            attempts = task.attempt,
            reason = %reason,
            "Task failed permanently"
        );

        let failure_log = self.failure_log.clone();
        let cmd_tx = self.cmd_tx.clone();
        let task_id = task.id;
        let resident_id = task.draft.resident_id;
        tokio::spawn(async move {
            // Write errors are reported by the writer itself
            let logged = failure_log
                .append(FailureRecord::new(resident_id.clone(), reason.clone()))
                .await
                .is_ok();
            let _ = cmd_tx.send(Command::FailureRecorded {
                task_id,
                resident_id,
                reason,
                logged,
            });
        });
    }

    fn start_cooldown(&mut self) {
        self.cooling += 1;
        let cmd_tx = self.cmd_tx.clone();
        let cooldown = self.settings.slot_cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let _ = cmd_tx.send(Command::SlotReady);
        });
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty() && self.recording == 0
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            max_concurrent: self.settings.max_concurrent,
            active: self.running.len(),
            pending: self.pending.len(),
            cooling_slots: self.cooling,
            submitted: self.counters.submitted,
            succeeded: self.counters.succeeded,
            requeued: self.counters.requeued,
            failed: self.counters.failed,
            accepting_new: self.accepting_new.load(Ordering::SeqCst),
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
