//! Append-only JSON-lines audit trail for media-gate.
//!
//! Every routing decision, signed link, client link and item-hiding pass
//! can be recorded as one newline-terminated JSON object. Entries are queued
//! on a channel and written by a background task, so callers never block on
//! file I/O.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource, DecisionRecord};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, writer) = AuditSink::start("/var/log/media-gate/audit.jsonl").await?;
//!
//! sink.log(
//!     AuditEntry::new(
//!         AuditEventType::RouteDecided,
//!         AuditSource::new("media-gate").with_client("Infuse"),
//!         serde_json::json!({ "candidate": "/mnt/media/movie.mkv" }),
//!     )
//!     .with_decision(DecisionRecord {
//!         decision: "redirect".into(),
//!         matched: None,
//!         stage: "default".into(),
//!     }),
//! )
//! .await;
//! drop(sink);
//! writer.await?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use entry::{AuditEntry, AuditEventType, AuditSource, DecisionRecord};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
