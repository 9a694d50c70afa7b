use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::entry::AuditEntry;
use crate::writer::{AuditWriteError, AuditWriter};

/// Channel buffer size used between producers and the background writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Flush the writer after this long without new entries.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// Cloneable handle for submitting [`AuditEntry`] values to the background
/// writer. The writer task exits once every clone has been dropped.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditSink {
    /// Open the audit log at `path` and spawn the background writer.
    ///
    /// The returned handle resolves to the number of entries written once
    /// the last sink is dropped and the final flush has completed. Write
    /// errors are logged and the entry is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<u64>), AuditWriteError> {
        let (tx, rx) = mpsc::channel::<AuditEntry>(CHANNEL_BUFFER);
        let writer = AuditWriter::new(path).await?;
        let handle = tokio::spawn(run_writer_loop(writer, rx));
        Ok((Self { tx }, handle))
    }

    /// Queue an entry, waiting for channel capacity if needed. Entries sent
    /// after the writer has exited are dropped with a warning.
    pub async fn log(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.send(entry).await {
            warn!(event_type = ?err.0.event_type, "audit sink closed; entry dropped");
        }
    }
}

/// Drain the channel into `writer`, flushing whenever it goes idle and once
/// more on close.
async fn run_writer_loop(mut writer: AuditWriter, mut rx: mpsc::Receiver<AuditEntry>) -> u64 {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        match tokio::time::timeout(flush_interval, rx.recv()).await {
            Ok(Some(entry)) => match writer.write(&entry).await {
                Ok(()) => dirty = true,
                Err(err) => error!(%err, "failed to write audit entry"),
            },
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        error!(%err, "failed to flush audit log on shutdown");
                    }
                }
                debug!(path = %writer.path().display(), written = writer.written(), "audit writer stopped");
                return writer.written();
            }
            Err(_) if dirty => match writer.flush().await {
                Ok(()) => dirty = false,
                Err(err) => error!(%err, "periodic audit log flush failed"),
            },
            Err(_) => {}
        }
    }
}
