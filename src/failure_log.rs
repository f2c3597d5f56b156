//! Append-only log of permanently failed tasks
//!
//! Every record is one JSON line. All writes go through a single writer task
//! that owns the file handle, so concurrent callers never interleave lines.
//! Storage faults are reported through `tracing` and handed back to the caller;
//! they never take the writer down.

use crate::error::{Error, Result};
use crate::types::FailureRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

struct AppendRequest {
    record: FailureRecord,
    ack: oneshot::Sender<Result<()>>,
}

/// Handle to the failure log writer lane
#[derive(Clone, Debug)]
pub struct FailureLog {
    tx: mpsc::UnboundedSender<AppendRequest>,
    path: PathBuf,
}

impl FailureLog {
    /// Start the writer lane for `path`.
    ///
    /// The file is created on the first append, not here.
    /// Must be called from within a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), rx));
        Self { tx, path }
    }

    /// Path records are appended to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and wait until it has been written
    pub async fn append(&self, record: FailureRecord) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendRequest { record, ack })
            .map_err(|_| Error::Other("failure log writer has stopped".to_string()))?;
        done.await
            .map_err(|_| Error::Other("failure log writer dropped the request".to_string()))?
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<AppendRequest>) {
    let mut file: Option<File> = None;

    while let Some(AppendRequest { record, ack }) = rx.recv().await {
        // A failed write leaves `file` empty so the next request reopens it
        let result = write_record(&path, &mut file, &record).await;
        if let Err(e) = &result {
            tracing::error!(
                path = %path.display(),
                resident_id = %record.resident_id,
                error = %e,
                "Failed to append to failure log"
            );
        }
        // Caller may have stopped waiting
        let _ = ack.send(result);
    }

    tracing::debug!(path = %path.display(), "Failure log writer stopped");
}

async fn write_record(
    path: &Path,
    file: &mut Option<File>,
    record: &FailureRecord,
) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut handle = match file.take() {
        Some(handle) => handle,
        None => {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?
        }
    };

    handle.write_all(&line).await?;
    handle.flush().await?;
    *file = Some(handle);
    Ok(())
}
