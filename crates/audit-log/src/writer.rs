use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::entry::AuditEntry;

/// Errors that can occur during audit log I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create parent directories for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open audit log {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to audit log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush audit log: {0}")]
    Flush(std::io::Error),
}

/// Buffered append-only writer producing one JSON object per line.
pub struct AuditWriter {
    path: PathBuf,
    out: BufWriter<tokio::fs::File>,
    written: u64,
}

impl AuditWriter {
    /// Open (or create) the audit log at `path` in append mode, creating
    /// missing parent directories.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, AuditWriteError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AuditWriteError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditWriteError::OpenFile {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written through this writer since it was opened.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Serialise `entry` as a single JSON line. Data reaches the file on the
    /// next [`flush`](Self::flush).
    pub async fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.out
            .write_all(&line)
            .await
            .map_err(AuditWriteError::Write)?;
        self.written += 1;

        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), AuditWriteError> {
        self.out.flush().await.map_err(AuditWriteError::Flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AuditEventType, AuditSource};

    #[tokio::test]
    async fn writes_one_line_per_entry_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/audit.jsonl");

        let mut writer = AuditWriter::new(&path).await.unwrap();
        for event in [AuditEventType::ProcessStarted, AuditEventType::ProcessStopped] {
            let entry = AuditEntry::new(event, AuditSource::new("test"), serde_json::Value::Null);
            writer.write(&entry).await.unwrap();
        }
        writer.flush().await.unwrap();
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.path(), path.as_path());
        drop(writer);

        let mut writer = AuditWriter::new(&path).await.unwrap();
        let entry = AuditEntry::new(
            AuditEventType::PolicyLoaded,
            AuditSource::new("test"),
            serde_json::Value::Null,
        );
        writer.write(&entry).await.unwrap();
        writer.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: AuditEntry = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.event_type, AuditEventType::PolicyLoaded);
    }

    #[tokio::test]
    async fn open_failure_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let err = AuditWriter::new(dir.path()).await.err().unwrap();
        assert!(matches!(err, AuditWriteError::OpenFile { .. }), "{err}");
    }
}
