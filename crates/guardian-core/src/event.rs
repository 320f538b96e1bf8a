//! Events and the per-unit append-only event log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Opaque token shared by every event of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a caller-supplied id. Blank ids are replaced by a generated one so
    /// the non-empty invariant always holds.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.trim().is_empty() {
            Self::generate()
        } else {
            Self(id)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event payload mapping
pub type Payload = Map<String, Value>;

/// Immutable record of something a unit did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    /// Id of the publishing unit
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub correlation_id: CorrelationId,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source_id: impl Into<String>,
        payload: Payload,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source_id: source_id.into(),
            timestamp: Utc::now(),
            payload,
            correlation_id,
        }
    }

    /// Look up a payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Build a payload from a `json!` object literal. Non-object values are
/// wrapped under a `value` key.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Append-only record of the events one unit published and consumed.
///
/// A log lives exactly as long as the unit that owns it; the orchestrator
/// builds fresh units per run, so logs never mix runs.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    published: Vec<Event>,
    consumed: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&mut self, event: Event) {
        self.published.push(event);
    }

    pub fn record_consumed(&mut self, event: Event) {
        self.consumed.push(event);
    }

    pub fn published(&self) -> &[Event] {
        &self.published
    }

    pub fn consumed(&self) -> &[Event] {
        &self.consumed
    }

    /// Published events of one type, in order
    pub fn published_of<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.published
            .iter()
            .filter(move |e| e.event_type == event_type)
    }

    /// Timestamp of the most recent publish or consume
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        let last_published = self.published.last().map(|e| e.timestamp);
        let last_consumed = self.consumed.last().map(|e| e.timestamp);
        last_published.max(last_consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_correlation_id_is_replaced() {
        let id = CorrelationId::new("   ");
        assert!(!id.as_str().trim().is_empty());
        assert_eq!(CorrelationId::new("run-1").as_str(), "run-1");
    }

    #[test]
    fn test_log_keeps_order_and_filters() {
        let cid = CorrelationId::new("run-1");
        let mut log = EventLog::new();
        log.record_published(Event::new("A", "unit", Payload::new(), cid.clone()));
        log.record_published(Event::new("B", "unit", Payload::new(), cid.clone()));
        log.record_published(Event::new("A", "unit", Payload::new(), cid));

        let types: Vec<_> = log.published().iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["A", "B", "A"]);
        assert_eq!(log.published_of("A").count(), 2);
        assert!(log.consumed().is_empty());
        assert!(log.last_activity().is_some());
    }

    #[test]
    fn test_payload_wraps_non_objects() {
        let map = payload(json!(3));
        assert_eq!(map.get("value"), Some(&json!(3)));
        let map = payload(json!({"reason": "x"}));
        assert_eq!(map.get("reason"), Some(&json!("x")));
    }
}
