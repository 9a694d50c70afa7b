use serde::{Deserialize, Serialize};

/// A single audit log entry describing one gate decision or lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionRecord>,
}

impl AuditEntry {
    /// Create a new `AuditEntry` with an auto-generated UUID v4 and the current
    /// UTC timestamp. `decision` defaults to `None`.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            decision: None,
        }
    }

    /// Attach the route decision this entry records.
    pub fn with_decision(mut self, decision: DecisionRecord) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// The category of audit event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RouteDecided,
    LinkSigned,
    ClientLinkIssued,
    ItemsHidden,
    PolicyLoaded,
    ProcessStarted,
    ProcessStopped,
}

/// Who asked: the component that produced the event plus whatever it knows
/// about the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    /// Client identifier, e.g. the `X-Emby-Client` argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

impl AuditSource {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

/// Outcome of a route decision attached to an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    /// Precedence stage that produced the decision.
    pub stage: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_event_and_optional_fields_skipped() {
        let entry = AuditEntry::new(
            AuditEventType::RouteDecided,
            AuditSource::new("media-gate").with_client("Infuse"),
            serde_json::json!({ "candidate": "/mnt/media/a.mkv" }),
        )
        .with_decision(DecisionRecord {
            decision: "proxy".into(),
            matched: None,
            stage: "mount_path".into(),
        });

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["event_type"], "route_decided");
        assert_eq!(value["source"]["client"], "Infuse");
        assert!(value["source"].get("remote_addr").is_none());
        assert_eq!(value["decision"]["stage"], "mount_path");
        assert!(value["decision"].get("matched").is_none());
    }

    #[test]
    fn entries_without_decision_omit_it() {
        let entry = AuditEntry::new(
            AuditEventType::PolicyLoaded,
            AuditSource::new("media-gate"),
            serde_json::Value::Null,
        );
        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains("\"decision\""));

        let back: AuditEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.event_type, AuditEventType::PolicyLoaded);
    }
}
