//! Audit entries and the events they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Property key holding the session identifier of an entry.
pub const SESSION_ID: &str = "sid";

/// Unique identifier of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Something that can be recorded in the audit trail.
pub trait Event {
    /// Event type name, stored as the entry schema.
    fn schema(&self) -> &'static str;

    /// Flattened string properties of the event.
    fn properties(&self) -> BTreeMap<String, String>;
}

/// One recorded event in the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EventId,
    /// Causal parent, if this entry was triggered by another one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EventId>,
    pub schema: String,
    /// Caller-supplied timestamp
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl AuditEntry {
    /// Build an entry for `event`, stamped with the current time.
    pub fn new<E: Event + ?Sized>(parent: Option<EventId>, event: &E) -> Self {
        Self {
            id: EventId::new(),
            parent,
            schema: event.schema().to_string(),
            time: Utc::now(),
            properties: event.properties(),
        }
    }

    /// Override the timestamp.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.property(SESSION_ID)
    }
}

/// An authentication attempt against the auth server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub session_id: String,
    pub user: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AuthAttempt {
    /// A successful attempt by `user` in session `session_id`.
    pub fn new(session_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user: user.into(),
            success: true,
            error: None,
        }
    }

    /// Mark the attempt as failed.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

impl Event for AuthAttempt {
    fn schema(&self) -> &'static str {
        "auth.attempt"
    }

    fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(SESSION_ID.to_string(), self.session_id.clone());
        props.insert("user".to_string(), self.user.clone());
        props.insert("success".to_string(), self.success.to_string());
        if let Some(ref error) = self.error {
            props.insert("error".to_string(), error.clone());
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_attempt_properties() {
        let attempt = AuthAttempt::new("sid1", "bob");
        let props = attempt.properties();

        assert_eq!(props.get("sid").map(String::as_str), Some("sid1"));
        assert_eq!(props.get("user").map(String::as_str), Some("bob"));
        assert_eq!(props.get("success").map(String::as_str), Some("true"));
        assert!(!props.contains_key("error"));
    }

    #[test]
    fn test_failed_attempt_records_error() {
        let attempt = AuthAttempt::new("sid2", "eve").failed("certificate expired");
        let entry = AuditEntry::new(None, &attempt);

        assert_eq!(entry.schema, "auth.attempt");
        assert_eq!(entry.property("success"), Some("false"));
        assert_eq!(entry.property("error"), Some("certificate expired"));
        assert_eq!(entry.session_id(), Some("sid2"));
    }

    #[test]
    fn test_entry_parent_link() {
        let root = AuditEntry::new(None, &AuthAttempt::new("sid1", "bob"));
        let child = AuditEntry::new(Some(root.id), &AuthAttempt::new("sid1", "bob"));

        assert_eq!(child.parent, Some(root.id));
        assert_ne!(child.id, root.id);
    }

    #[test]
    fn test_entry_json_shape() {
        let time = DateTime::parse_from_rfc3339("2009-11-10T23:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = AuditEntry::new(None, &AuthAttempt::new("sid1", "bob")).with_time(time);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["schema"], "auth.attempt");
        assert_eq!(json["time"], "2009-11-10T23:00:00Z");
        assert_eq!(json["properties"]["sid"], "sid1");
        assert!(json.get("parent").is_none());

        let back: AuditEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
