use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::event_sourcing::codec::{JsonCodec, RecordCodec};
use crate::event_sourcing::core::{AggregateIdentity, Result, Snapshot, Version};
use crate::event_sourcing::sharding::{
    ShardMetadataProvider, ShardRef, ShardingStrategy, UNKNOWN_OFFSET,
};
use crate::messaging::{LogBroker, SeekPosition};
use crate::metrics::Metrics;

use super::event_store::{io_failure, DEFAULT_POLL_TIMEOUT};
use super::reader::RecordReader;
use super::search::BinarySearchStrategy;

// ============================================================================
// Snapshot Repository
// ============================================================================
//
// Snapshots of an aggregate live in their own exclusive stream, appended in
// version order, so versions increase with offsets. Lookups read single
// records at computed offsets:
//
// - latest:                 record at the last offset
// - latest before version:  last record first (fast path), else bisection
//                           over [0, last] keeping the best qualifying record
// - latest before time:     record at the broker's time-index answer
// - first after time:       same, at-or-after
//
// ============================================================================

pub struct SnapshotRepository<S> {
    broker: Arc<dyn LogBroker>,
    sharding: ShardingStrategy,
    metadata: ShardMetadataProvider,
    codec: Arc<dyn RecordCodec<Snapshot<S>>>,
    reader: RecordReader<Snapshot<S>>,
    metrics: Option<Arc<Metrics>>,
}

impl<S> SnapshotRepository<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(broker: Arc<dyn LogBroker>) -> Self {
        let codec: Arc<dyn RecordCodec<Snapshot<S>>> = Arc::new(JsonCodec::new());
        Self {
            metadata: ShardMetadataProvider::new(broker.clone()),
            reader: RecordReader::new(codec.clone(), DEFAULT_POLL_TIMEOUT),
            broker,
            sharding: ShardingStrategy::snapshot_store(),
            codec,
            metrics: None,
        }
    }

    /// Stream-name suffix separating snapshot streams from event streams
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sharding = ShardingStrategy::SnapshotStore {
            suffix: suffix.into(),
        };
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.reader = RecordReader::new(self.codec.clone(), poll_timeout)
            .with_metrics(self.metrics.clone());
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

    /// Most recent snapshot
    pub async fn latest(&self, id: &AggregateIdentity) -> Result<Option<Snapshot<S>>> {
        let shard = self.shard_for(id);
        let last = self.metadata.last_offset(&shard).await;
        if last == UNKNOWN_OFFSET {
            self.record_lookup("empty", 0);
            return Ok(None);
        }

        let snapshot = self.read_at(&shard, id, last).await?;
        self.record_lookup("fast", 1);
        Ok(snapshot)
    }

    /// Most recent snapshot whose version is strictly below `before`
    pub async fn latest_before_version(
        &self,
        id: &AggregateIdentity,
        before: Version,
    ) -> Result<Option<Snapshot<S>>> {
        let shard = self.shard_for(id);
        let last = self.metadata.last_offset(&shard).await;
        if last == UNKNOWN_OFFSET {
            self.record_lookup("empty", 0);
            return Ok(None);
        }

        // Fast path: the newest snapshot already qualifies
        let newest = self.read_at(&shard, id, last).await?;
        let mut reads = 1;
        if let Some(snapshot) = newest {
            if snapshot.version < before {
                self.record_lookup("fast", reads);
                return Ok(Some(snapshot));
            }
        }

        let mut best = None;
        let mut strategy = BinarySearchStrategy::new(0, last);

        while let Some(offset) = strategy.next_offset_to_try() {
            reads += 1;
            match self.read_at(&shard, id, offset).await? {
                Some(snapshot) if snapshot.version < before => {
                    tracing::debug!(
                        shard = %shard,
                        offset,
                        version = %snapshot.version,
                        "Snapshot candidate qualifies, searching upward"
                    );
                    best = Some(snapshot);
                    strategy = strategy.search_upper();
                }
                _ => {
                    tracing::debug!(shard = %shard, offset, "Snapshot candidate too new, searching downward");
                    strategy = strategy.search_lower();
                }
            }
        }

        self.record_lookup("search", reads);
        Ok(best)
    }

    /// Most recent snapshot taken strictly before `instant`
    pub async fn latest_before_time(
        &self,
        id: &AggregateIdentity,
        instant: DateTime<Utc>,
    ) -> Result<Option<Snapshot<S>>> {
        let shard = self.shard_for(id);
        let offset = self.metadata.offset_before(&shard, instant).await;
        self.read_by_time(&shard, id, offset).await
    }

    /// First snapshot taken at or after `instant`
    pub async fn first_after_time(
        &self,
        id: &AggregateIdentity,
        instant: DateTime<Utc>,
    ) -> Result<Option<Snapshot<S>>> {
        let shard = self.shard_for(id);
        let offset = self.metadata.offset_after_or_at(&shard, instant).await;
        self.read_by_time(&shard, id, offset).await
    }

    /// Append a snapshot; returns its offset. Snapshots are plain
    /// materializations of committed state, so no concurrency check applies.
    pub async fn save(&self, snapshot: &Snapshot<S>) -> Result<i64> {
        let shard = self.shard_for(&snapshot.aggregate_id);
        let payload = self.codec.encode(snapshot)?;

        let offset = self
            .broker
            .append(&shard, snapshot.aggregate_id.as_str(), payload, snapshot.timestamp)
            .await
            .map_err(|e| io_failure(&shard, "append snapshot", e))?;

        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_written();
        }

        tracing::info!(
            aggregate_id = %snapshot.aggregate_id,
            shard = %shard,
            version = %snapshot.version,
            offset,
            "Saved snapshot"
        );

        Ok(offset)
    }

    async fn read_by_time(
        &self,
        shard: &ShardRef,
        id: &AggregateIdentity,
        offset: i64,
    ) -> Result<Option<Snapshot<S>>> {
        if offset == UNKNOWN_OFFSET {
            self.record_lookup("empty", 0);
            return Ok(None);
        }

        let snapshot = self.read_at(shard, id, offset).await?;
        self.record_lookup("time", 1);
        Ok(snapshot)
    }

    /// Read the single record at `offset`
    async fn read_at(
        &self,
        shard: &ShardRef,
        id: &AggregateIdentity,
        offset: i64,
    ) -> Result<Option<Snapshot<S>>> {
        let mut cursor = self
            .broker
            .open_cursor(shard)
            .await
            .map_err(|e| io_failure(shard, "open cursor", e))?;
        cursor
            .seek(SeekPosition::Offset(offset))
            .await
            .map_err(|e| io_failure(shard, "seek", e))?;

        let mut records = self.reader.read(cursor.as_mut(), shard, id, Some(1)).await?;
        Ok(records.pop().map(|(_, snapshot)| snapshot))
    }

    fn record_lookup(&self, path: &str, reads: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_lookup(path, reads);
        }
    }
}
