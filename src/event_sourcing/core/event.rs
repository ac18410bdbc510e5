use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::identity::AggregateIdentity;
use super::version::Version;

// ============================================================================
// Event Envelope - Industry Standard Event Metadata
// ============================================================================
//
// Wraps a domain event with identity, ordering and tracing metadata.
// `sequence_number` stays `Version::NONE` until the event is committed; once
// read back from its shard it equals the record's offset and never changes.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: AggregateIdentity,
    pub sequence_number: Version,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation (for distributed tracing)
    pub causation_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,

    // Generation time
    pub timestamp: DateTime<Utc>,

    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(aggregate_id: AggregateIdentity, event_data: E, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number: Version::NONE,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            causation_id: None,
            correlation_id: None,
            timestamp,
            metadata: HashMap::new(),
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_committed(&self) -> bool {
        !self.sequence_number.is_none()
    }

    pub(crate) fn at_offset(mut self, offset: i64) -> Self {
        self.sequence_number = Version::from_offset(offset);
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Payload of an event envelope.
///
/// Implemented by the per-aggregate event enum.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn event_version(&self) -> i32 {
        1
    }
}

// ============================================================================
// Event Stream - result of an event store read
// ============================================================================

#[derive(Debug, Clone)]
pub struct EventStream<E> {
    events: Vec<EventEnvelope<E>>,
    version: Version,
}

impl<E> EventStream<E> {
    /// Stream of an aggregate with no committed history
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            version: Version::NONE,
        }
    }

    /// Version is derived from the last event
    pub fn from_events(events: Vec<EventEnvelope<E>>) -> Self {
        let version = events
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(Version::NONE);
        Self { events, version }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn events(&self) -> &[EventEnvelope<E>] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EventEnvelope<E>> {
        self.events
    }

    /// Drop every event after `version`
    pub fn up_to_version(self, version: Version) -> Self {
        let events = self
            .events
            .into_iter()
            .take_while(|e| e.sequence_number <= version)
            .collect();
        Self::from_events(events)
    }

    /// Keep only events generated strictly before `instant`
    pub fn before_time(self, instant: DateTime<Utc>) -> Self {
        let events = self
            .events
            .into_iter()
            .take_while(|e| e.timestamp < instant)
            .collect();
        Self::from_events(events)
    }
}

// ============================================================================
// Tests
// ============================================================================
