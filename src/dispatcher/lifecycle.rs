//! Shutdown coordination.

use std::sync::atomic::Ordering;

use tokio::sync::oneshot;

use super::{Dispatcher, lock_intake};
use super::actor::Command;
use crate::error::Result;

impl Dispatcher {
    /// Gracefully shut down the dispatcher
    ///
    /// 1. Stops accepting new batches ([`crate::Error::ShuttingDown`] from then on)
    /// 2. Waits until every accepted task has succeeded or been recorded in
    ///    the failure log; running tasks are never cancelled
    /// 3. Stops the actor
    ///
    /// Calling it again after the actor has stopped is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        {
            // A batch that already passed the acceptance check is sent before this returns
            let _intake = lock_intake(&self.intake);
            self.accepting_new.store(false, Ordering::SeqCst);
        }
        tracing::info!("Stopped accepting new batches");

        let (reply, drained) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(reply)).is_err() {
            tracing::debug!("Dispatcher already stopped");
            return Ok(());
        }

        // A dropped reply means the actor exited between the send and the drain check
        if drained.await.is_err() {
            tracing::debug!("Dispatcher stopped before acknowledging shutdown");
            return Ok(());
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
