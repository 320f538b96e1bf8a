//! Processing unit ("agent") contract
//!
//! Every pipeline stage owns an [`AgentCore`] holding its identity and
//! [`EventLog`], and implements [`Agent::process`]. Publishing, consuming and
//! status reporting are shared infrastructure; `process` is the only place
//! with domain behaviour.
//!
//! `process` never returns an error. Failures of external dependencies are
//! published as `...Failed` or `...Skipped` events and the best available
//! fallback (usually the unmodified input) is returned instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{CorrelationId, Event, EventLog, Payload};

/// Identity and event bookkeeping shared by all units
#[derive(Debug, Clone)]
pub struct AgentCore {
    id: String,
    name: String,
    ai_available: bool,
    created_at: DateTime<Utc>,
    log: EventLog,
}

impl AgentCore {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ai_available: false,
            created_at: Utc::now(),
            log: EventLog::new(),
        }
    }

    /// Record whether this unit has a usable oracle. Fixed at construction.
    pub fn with_ai(mut self, available: bool) -> Self {
        self.ai_available = available;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ai_available(&self) -> bool {
        self.ai_available
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Create an event stamped with this unit's id and the current time,
    /// append it to the published log and hand a copy back.
    pub fn publish(
        &mut self,
        event_type: &str,
        payload: Payload,
        correlation_id: &CorrelationId,
    ) -> Event {
        let event = Event::new(event_type, self.id.clone(), payload, correlation_id.clone());
        tracing::info!(
            agent = %self.id,
            correlation_id = %correlation_id,
            "Published event: {}",
            event_type
        );
        self.log.record_published(event.clone());
        event
    }

    /// Pure bookkeeping; stage-specific reactions live in `Agent::consume`.
    pub fn consume(&mut self, event: Event) {
        tracing::debug!(
            agent = %self.id,
            source = %event.source_id,
            "Consumed event: {}",
            event.event_type
        );
        self.log.record_consumed(event);
    }

    /// Point-in-time snapshot for health reporting
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            status: "active".to_string(),
            published_count: self.log.published().len(),
            consumed_count: self.log.consumed().len(),
            ai_available: self.ai_available,
            last_activity: self.log.last_activity().unwrap_or(self.created_at),
        }
    }
}

/// Health snapshot of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    pub published_count: usize,
    pub consumed_count: usize,
    pub ai_available: bool,
    pub last_activity: DateTime<Utc>,
}

/// A named pipeline stage
#[async_trait]
pub trait Agent: Send {
    type Input: Clone + Send + 'static;
    type Output: Send + 'static;

    /// Event type published when an invocation is abandoned from outside,
    /// e.g. on timeout.
    const FAILED_EVENT: &'static str;

    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    /// Run the stage. Publishes exactly one terminal event per call.
    async fn process(&mut self, input: Self::Input, correlation_id: &CorrelationId)
        -> Self::Output;

    /// Output to use when `process` could not complete
    fn fallback(&self, input: Self::Input, correlation_id: &CorrelationId) -> Self::Output;

    /// Receive an event published by another unit
    fn consume(&mut self, event: Event) {
        self.core_mut().consume(event);
    }

    fn status(&self) -> AgentStatus {
        self.core().status()
    }
}
