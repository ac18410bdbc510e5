use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::clock::Clock;
use super::errors::{Result, StoreError, ValidationError};
use super::event::{DomainEvent, EventEnvelope, EventStream};
use super::identity::AggregateIdentity;
use super::snapshot::Snapshot;
use super::version::Version;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. The first event of every history is the creation event
// 4. A snapshot restores the baseline state; tail events are applied on top
//
// Concrete aggregates implement the capability traits below. The generic
// AggregateRoot carries identity, version and pending changes for them.
//
// ============================================================================

pub trait Identifiable {
    fn id(&self) -> &AggregateIdentity;
}

pub trait Versioned {
    fn version(&self) -> Version;
}

/// Folds events into domain state
pub trait EventApplier: Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create state from the creation event. Any other event type is an error.
    fn apply_first_event(event: &Self::Event) -> std::result::Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> std::result::Result<(), Self::Error>;
}

/// Converts domain state to and from a snapshot payload
pub trait Snapshottable: Sized {
    type State: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    fn to_snapshot_state(&self) -> Self::State;

    fn from_snapshot_state(state: Self::State) -> Self;
}

/// Generic aggregate contract
///
/// `DOMAIN`, `OBJECT_TYPE` and `SYMBOL` make up the aggregate's identities.
pub trait Aggregate: EventApplier + Snapshottable + Send + Sync {
    type Command;

    const DOMAIN: &'static str;
    const OBJECT_TYPE: &'static str;
    const SYMBOL: &'static str;

    /// Validate a creation command and produce the creation event
    fn handle_creation(command: &Self::Command) -> std::result::Result<Self::Event, Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(
        &self,
        command: &Self::Command,
    ) -> std::result::Result<Vec<Self::Event>, Self::Error>;
}

// ============================================================================
// Aggregate Root - identity, version and pending changes around domain state
// ============================================================================

pub struct AggregateRoot<A: Aggregate> {
    id: AggregateIdentity,
    version: Version,
    state: A,
    pending: Vec<EventEnvelope<A::Event>>,
    clock: Arc<dyn Clock>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Create a fresh aggregate whose only pending change is the creation event
    pub fn create(id: AggregateIdentity, creation_event: A::Event, clock: Arc<dyn Clock>) -> Result<Self> {
        let state = A::apply_first_event(&creation_event).map_err(|e| reconstruction(&id, e))?;
        let envelope = EventEnvelope::new(id.clone(), creation_event, clock.now());

        Ok(Self {
            id,
            version: Version::NONE,
            state,
            pending: vec![envelope],
            clock,
        })
    }

    /// Create a fresh aggregate from a creation command
    pub fn create_from_command(command: &A::Command, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let id = AggregateIdentity::generate(A::DOMAIN, A::OBJECT_TYPE, A::SYMBOL)?;
        let event = A::handle_creation(command)?;
        Ok(Self::create(id, event, clock)?)
    }

    /// Reconstruct from a full event history
    pub fn from_events(id: AggregateIdentity, stream: EventStream<A::Event>, clock: Arc<dyn Clock>) -> Result<Self> {
        if stream.is_empty() {
            return Err(StoreError::NotFound(id));
        }

        let version = stream.version();
        let mut events = stream.into_events().into_iter();

        // Checked non-empty above
        let first = match events.next() {
            Some(first) => first,
            None => return Err(StoreError::NotFound(id)),
        };

        let mut state = A::apply_first_event(&first.event_data).map_err(|e| reconstruction(&id, e))?;

        for envelope in events {
            state
                .apply_event(&envelope.event_data)
                .map_err(|e| reconstruction(&id, e))?;
        }

        Ok(Self {
            id,
            version,
            state,
            pending: Vec::new(),
            clock,
        })
    }

    /// Reconstruct from a snapshot plus the events committed after it
    pub fn from_snapshot(
        snapshot: Snapshot<A::State>,
        tail: EventStream<A::Event>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let id = snapshot.aggregate_id;
        let version = if tail.is_empty() {
            snapshot.version
        } else {
            tail.version()
        };

        let mut state = A::from_snapshot_state(snapshot.state);
        for envelope in tail.events() {
            state
                .apply_event(&envelope.event_data)
                .map_err(|e| reconstruction(&id, e))?;
        }

        Ok(Self {
            id,
            version,
            state,
            pending: Vec::new(),
            clock,
        })
    }

    /// Run a command against the current state; resulting events are applied
    /// and queued as pending changes
    pub fn execute(&mut self, command: &A::Command) -> std::result::Result<usize, A::Error> {
        let events = self.state.handle_command(command)?;
        let count = events.len();

        for event in events {
            self.state.apply_event(&event)?;
            self.pending
                .push(EventEnvelope::new(self.id.clone(), event, self.clock.now()));
        }

        Ok(count)
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn pending_changes(&self) -> &[EventEnvelope<A::Event>] {
        &self.pending
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Tag every pending event with the request that caused it
    pub fn correlate(&mut self, correlation_id: Uuid) {
        for envelope in &mut self.pending {
            envelope.correlation_id = Some(correlation_id);
        }
    }

    /// Materialize the committed state. Fails while nothing has been
    /// committed or while changes are still pending.
    pub fn snapshot(&self) -> Result<Snapshot<A::State>> {
        if self.has_pending_changes() {
            return Err(ValidationError::PendingChanges {
                id: self.id.to_string(),
                pending: self.pending.len(),
            }
            .into());
        }

        Ok(Snapshot::new(
            self.id.clone(),
            self.version,
            self.state.to_snapshot_state(),
            self.clock.now(),
        )?)
    }

    pub(crate) fn mark_committed(&mut self, version: Version) -> Vec<EventEnvelope<A::Event>> {
        self.version = version;
        std::mem::take(&mut self.pending)
    }
}

impl<A: Aggregate> Identifiable for AggregateRoot<A> {
    fn id(&self) -> &AggregateIdentity {
        &self.id
    }
}

impl<A: Aggregate> Versioned for AggregateRoot<A> {
    fn version(&self) -> Version {
        self.version
    }
}

impl<A: Aggregate + fmt::Debug> fmt::Debug for AggregateRoot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn reconstruction(id: &AggregateIdentity, error: impl fmt::Display) -> StoreError {
    StoreError::Reconstruction {
        id: id.clone(),
        message: error.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
