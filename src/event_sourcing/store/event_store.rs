use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::event_sourcing::codec::{JsonCodec, RecordCodec};
use crate::event_sourcing::core::{
    AggregateIdentity, DomainEvent, EventEnvelope, EventStream, Result, StoreError, ValidationError,
    Version,
};
use crate::event_sourcing::sharding::{ShardMetadataProvider, ShardRef, ShardingStrategy};
use crate::messaging::{LogBroker, SeekPosition};
use crate::metrics::Metrics;

use super::reader::RecordReader;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Generic Event Store - Repository for Events
// ============================================================================
//
// This is a GENERIC event store that works with ANY event type.
//
// Every aggregate owns an exclusive single-partition stream named after its
// identity. A record's offset in that stream is the event's sequence number,
// and the offset of the last record is the aggregate's version.
//
// Responsibilities:
// 1. Append events keyed by the aggregate identity (append-only)
// 2. Load event history from the start or from a given offset
// 3. Optimistic concurrency control against the shard's last offset
//
// The concurrency check and the writes are separate broker calls. Two writers
// passing the check at the same time both succeed; callers that need strict
// serialization must coordinate outside the store.
//
// ============================================================================

pub struct EventStore<E: DomainEvent> {
    broker: Arc<dyn LogBroker>,
    sharding: ShardingStrategy,
    metadata: ShardMetadataProvider,
    codec: Arc<dyn RecordCodec<EventEnvelope<E>>>,
    reader: RecordReader<EventEnvelope<E>>,
    poll_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<E: DomainEvent> EventStore<E> {
    pub fn new(broker: Arc<dyn LogBroker>) -> Self {
        let codec: Arc<dyn RecordCodec<EventEnvelope<E>>> = Arc::new(JsonCodec::new());
        Self {
            metadata: ShardMetadataProvider::new(broker.clone()),
            reader: RecordReader::new(codec.clone(), DEFAULT_POLL_TIMEOUT),
            broker,
            sharding: ShardingStrategy::EventStore,
            codec,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec<EventEnvelope<E>>>) -> Self {
        self.reader = RecordReader::new(codec.clone(), self.poll_timeout)
            .with_metrics(self.metrics.clone());
        self.codec = codec;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.reader = RecordReader::new(self.codec.clone(), poll_timeout)
            .with_metrics(self.metrics.clone());
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metadata = self.metadata.with_metrics(metrics.clone());
        self.reader = self.reader.with_metrics(Some(metrics.clone()));
        self.metrics = Some(metrics);
        self
    }

    pub fn shard_for(&self, id: &AggregateIdentity) -> ShardRef {
        self.sharding.shard_for(id)
    }

    /// Full history of an aggregate; an explicitly empty stream when nothing
    /// has been committed
    pub async fn load_all(&self, id: &AggregateIdentity) -> Result<EventStream<E>> {
        self.load(id, SeekPosition::Beginning).await
    }

    /// History starting at offset `position`
    pub async fn load_from(&self, id: &AggregateIdentity, position: i64) -> Result<EventStream<E>> {
        self.load(id, SeekPosition::Offset(position.max(0))).await
    }

    async fn load(&self, id: &AggregateIdentity, position: SeekPosition) -> Result<EventStream<E>> {
        let shard = self.shard_for(id);

        let mut cursor = self
            .broker
            .open_cursor(&shard)
            .await
            .map_err(|e| io_failure(&shard, "open cursor", e))?;
        cursor
            .seek(position)
            .await
            .map_err(|e| io_failure(&shard, "seek", e))?;

        let records = self.reader.read(cursor.as_mut(), &shard, id, None).await?;

        let events: Vec<EventEnvelope<E>> = records
            .into_iter()
            .map(|(offset, envelope)| envelope.at_offset(offset))
            .collect();

        tracing::debug!(
            aggregate_id = %id,
            shard = %shard,
            event_count = events.len(),
            "Loaded events"
        );

        Ok(EventStream::from_events(events))
    }

    /// Offset of the last committed event as a version (NONE when empty)
    pub async fn current_version(&self, id: &AggregateIdentity) -> Version {
        let shard = self.shard_for(id);
        Version::from_offset(self.metadata.last_offset(&shard).await)
    }

    pub async fn exists(&self, id: &AggregateIdentity) -> bool {
        !self.current_version(id).await.is_none()
    }

    /// Append events after `expected_version`.
    /// Returns the new version, the offset of the last appended event.
    pub async fn append(
        &self,
        id: &AggregateIdentity,
        expected_version: Version,
        events: &[EventEnvelope<E>],
    ) -> Result<Version> {
        let committed = self.commit(id, expected_version, events).await?;
        Ok(committed
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(expected_version))
    }

    /// Append and hand back the events stamped with their sequence numbers
    pub(crate) async fn commit(
        &self,
        id: &AggregateIdentity,
        expected_version: Version,
        events: &[EventEnvelope<E>],
    ) -> Result<Vec<EventEnvelope<E>>> {
        if events.is_empty() {
            return Err(ValidationError::EmptyChangeSet.into());
        }

        let started = Instant::now();
        let shard = self.shard_for(id);

        // Check optimistic concurrency; an unanswered query must not pass as empty
        let current = self
            .metadata
            .try_last_offset(&shard)
            .await
            .map_err(|e| io_failure(&shard, "end offset", e))?;
        if current > expected_version.value() {
            tracing::warn!(
                aggregate_id = %id,
                shard = %shard,
                current_offset = current,
                expected_version = %expected_version,
                "Concurrency conflict, append rejected"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_conflict();
            }
            return Err(StoreError::ConcurrencyConflict {
                shard,
                current,
                expected: expected_version,
            });
        }

        let mut committed = Vec::with_capacity(events.len());
        for envelope in events {
            let payload = self.codec.encode(envelope)?;
            let offset = self
                .broker
                .append(&shard, id.as_str(), payload, envelope.timestamp)
                .await
                .map_err(|e| io_failure(&shard, "append", e))?;

            committed.push(envelope.clone().at_offset(offset));
        }

        let new_version = committed
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(expected_version);

        if let Some(metrics) = &self.metrics {
            metrics.record_append(
                self.sharding.role(),
                committed.len(),
                started.elapsed().as_secs_f64(),
            );
        }

        tracing::info!(
            aggregate_id = %id,
            shard = %shard,
            new_version = %new_version,
            event_count = committed.len(),
            "Appended events to event store"
        );

        Ok(committed)
    }
}

pub(crate) fn io_failure(
    shard: &ShardRef,
    operation: &str,
    error: crate::messaging::BrokerError,
) -> StoreError {
    tracing::error!(shard = %shard, operation = operation, error = %error, "Broker I/O failed");
    StoreError::broker(shard, error)
}

// ============================================================================
// Unit Tests
// ============================================================================
