use std::sync::Arc;

use crate::event_sourcing::codec::{JsonCodec, RecordCodec};
use crate::event_sourcing::core::{DomainEvent, EventEnvelope, Result};
use crate::event_sourcing::sharding::{ShardRef, ShardingStrategy};
use crate::messaging::LogBroker;
use crate::metrics::Metrics;

use super::event_store::io_failure;

// ============================================================================
// Event Publisher
// ============================================================================
//
// Forwards committed events to the shared per-type stream
// `<domain>.<object_type>` for downstream consumers. The partition is chosen
// by hashing the aggregate identity, so events of one aggregate stay in order
// while different aggregates spread over the partitions.
//
// ============================================================================

pub struct EventPublisher<E> {
    broker: Arc<dyn LogBroker>,
    sharding: ShardingStrategy,
    codec: Arc<dyn RecordCodec<EventEnvelope<E>>>,
    metrics: Option<Arc<Metrics>>,
}

impl<E: DomainEvent> EventPublisher<E> {
    pub fn new(broker: Arc<dyn LogBroker>) -> Self {
        Self {
            broker,
            sharding: ShardingStrategy::event_publishing(),
            codec: Arc::new(JsonCodec::new()),
            metrics: None,
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.sharding = ShardingStrategy::EventPublishing { partitions };
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shard_for(&self, envelope: &EventEnvelope<E>) -> ShardRef {
        self.sharding.shard_for(&envelope.aggregate_id)
    }

    /// Append each event, in order, to its publishing shard.
    /// Stops at the first failure; returns how many were published.
    pub async fn publish(&self, events: &[EventEnvelope<E>]) -> Result<usize> {
        let mut published = 0;

        for envelope in events {
            let shard = self.shard_for(envelope);
            let payload = self.codec.encode(envelope)?;

            let appended = self
                .broker
                .append(&shard, envelope.aggregate_id.as_str(), payload, envelope.timestamp)
                .await;

            if let Some(metrics) = &self.metrics {
                metrics.record_publish(appended.is_ok());
            }
            appended.map_err(|e| io_failure(&shard, "publish", e))?;

            tracing::debug!(
                aggregate_id = %envelope.aggregate_id,
                event_type = %envelope.event_type,
                shard = %shard,
                "Published event"
            );
            published += 1;
        }

        Ok(published)
    }
}
