use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::event_sourcing::core::{
    Aggregate, AggregateIdentity, AggregateRoot, Clock, EventStream, Identifiable, Result,
    StoreError, Versioned, Version,
};
use crate::messaging::LogBroker;
use crate::metrics::Metrics;

use super::event_store::EventStore;
use super::publisher::EventPublisher;
use super::snapshot_store::SnapshotRepository;

// ============================================================================
// Aggregate Repository
// ============================================================================
//
// Load path:  latest usable snapshot + events after it, else full replay.
// Save path:  pending changes appended with the aggregate's version as the
//             expected version. Conflicts propagate untouched.
//
// After a successful save the events are committed. Publishing and periodic
// snapshots run afterwards; their failures are logged and do not fail the
// save.
//
// ============================================================================

pub struct AggregateRepository<A: Aggregate> {
    events: EventStore<A::Event>,
    snapshots: SnapshotRepository<A::State>,
    publisher: Option<EventPublisher<A::Event>>,
    snapshot_interval: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl<A: Aggregate> AggregateRepository<A> {
    pub fn new(
        events: EventStore<A::Event>,
        snapshots: SnapshotRepository<A::State>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            snapshots,
            publisher: None,
            snapshot_interval: None,
            clock,
        }
    }

    /// Event and snapshot stores with default settings on one broker
    pub fn from_broker(broker: Arc<dyn LogBroker>, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            EventStore::new(broker.clone()),
            SnapshotRepository::new(broker),
            clock,
        )
    }

    pub fn with_publisher(mut self, publisher: EventPublisher<A::Event>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Write a snapshot every `interval` committed events (0 disables)
    pub fn with_snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = (interval > 0).then_some(interval);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.events = self.events.with_metrics(metrics.clone());
        self.snapshots = self.snapshots.with_metrics(metrics.clone());
        self.publisher = self.publisher.map(|p| p.with_metrics(metrics));
        self
    }

    pub fn event_store(&self) -> &EventStore<A::Event> {
        &self.events
    }

    pub fn snapshot_repository(&self) -> &SnapshotRepository<A::State> {
        &self.snapshots
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Commit the aggregate's pending changes; returns the new version
    pub async fn save(&self, aggregate: &mut AggregateRoot<A>) -> Result<Version> {
        let id = aggregate.id().clone();
        let previous = aggregate.version();

        let committed = self
            .events
            .commit(&id, previous, aggregate.pending_changes())
            .await?;

        let new_version = committed
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(previous);
        aggregate.mark_committed(new_version);

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&committed).await {
                tracing::warn!(
                    aggregate_id = %id,
                    version = %new_version,
                    error = %e,
                    "Events committed but publishing failed"
                );
            }
        }

        if self.crossed_snapshot_boundary(previous, new_version) {
            if let Err(e) = self.snapshot(aggregate).await {
                tracing::warn!(
                    aggregate_id = %id,
                    version = %new_version,
                    error = %e,
                    "Events committed but snapshot failed"
                );
            }
        }

        Ok(new_version)
    }

    /// Current state: snapshot plus tail, or full replay
    pub async fn get_by_id(&self, id: &AggregateIdentity) -> Result<AggregateRoot<A>> {
        match self.snapshots.latest(id).await? {
            Some(snapshot) => {
                let tail = self.events.load_from(id, snapshot.version.next()).await?;
                tracing::debug!(
                    aggregate_id = %id,
                    snapshot_version = %snapshot.version,
                    tail_events = tail.len(),
                    "Loading aggregate from snapshot"
                );
                AggregateRoot::from_snapshot(snapshot, tail, self.clock.clone())
            }
            None => {
                let stream = self.events.load_all(id).await?;
                tracing::debug!(aggregate_id = %id, events = stream.len(), "Loading aggregate by replay");
                AggregateRoot::from_events(id.clone(), stream, self.clock.clone())
            }
        }
    }

    /// State as it was right after `version` was committed
    pub async fn get_at_version(
        &self,
        id: &AggregateIdentity,
        version: Version,
    ) -> Result<AggregateRoot<A>> {
        if version.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }

        let before = Version::from_offset(version.next());
        match self.snapshots.latest_before_version(id, before).await? {
            Some(snapshot) => {
                let tail = self
                    .events
                    .load_from(id, snapshot.version.next())
                    .await?
                    .up_to_version(version);
                AggregateRoot::from_snapshot(snapshot, tail, self.clock.clone())
            }
            None => {
                let stream = self.events.load_all(id).await?.up_to_version(version);
                AggregateRoot::from_events(id.clone(), stream, self.clock.clone())
            }
        }
    }

    /// State built from the events generated strictly before `instant`
    pub async fn get_as_of(
        &self,
        id: &AggregateIdentity,
        instant: DateTime<Utc>,
    ) -> Result<AggregateRoot<A>> {
        match self.snapshots.latest_before_time(id, instant).await? {
            Some(snapshot) => {
                let tail = self
                    .events
                    .load_from(id, snapshot.version.next())
                    .await?
                    .before_time(instant);
                AggregateRoot::from_snapshot(snapshot, tail, self.clock.clone())
            }
            None => {
                let stream: EventStream<A::Event> =
                    self.events.load_all(id).await?.before_time(instant);
                AggregateRoot::from_events(id.clone(), stream, self.clock.clone())
            }
        }
    }

    /// Persist a snapshot of a committed aggregate; returns its offset
    pub async fn snapshot(&self, aggregate: &AggregateRoot<A>) -> Result<i64> {
        let snapshot = aggregate.snapshot()?;
        self.snapshots.save(&snapshot).await
    }

    pub async fn exists(&self, id: &AggregateIdentity) -> bool {
        self.events.exists(id).await
    }

    fn crossed_snapshot_boundary(&self, previous: Version, current: Version) -> bool {
        match self.snapshot_interval {
            // next() is the number of committed events
            Some(interval) => {
                (previous.next() as u64) / interval != (current.next() as u64) / interval
            }
            None => false,
        }
    }
}
