use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::ShardRef;
use crate::messaging::{BrokerError, LogBroker};
use crate::metrics::Metrics;

/// Sentinel for an empty or inaccessible shard
pub const UNKNOWN_OFFSET: i64 = -1;

/// Boundary-offset queries against one shard.
///
/// The read-side queries never fail: broker errors are logged and degrade to
/// `UNKNOWN_OFFSET`, so callers treat them as "nothing found yet". Writers
/// must not confuse an outage with an empty shard and use `try_last_offset`.
#[derive(Clone)]
pub struct ShardMetadataProvider {
    broker: Arc<dyn LogBroker>,
    metrics: Option<Arc<Metrics>>,
}

impl ShardMetadataProvider {
    pub fn new(broker: Arc<dyn LogBroker>) -> Self {
        Self {
            broker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Like `last_offset`, but a failed query is an error rather than
    /// `UNKNOWN_OFFSET`
    pub async fn try_last_offset(&self, shard: &ShardRef) -> Result<i64, BrokerError> {
        let end = self.broker.end_offset(shard).await?;
        Ok(if end > 0 { end - 1 } else { UNKNOWN_OFFSET })
    }

    /// Offset of the last record in the shard
    pub async fn last_offset(&self, shard: &ShardRef) -> i64 {
        match self.broker.end_offset(shard).await {
            Ok(end) if end > 0 => end - 1,
            Ok(_) => UNKNOWN_OFFSET,
            Err(e) => self.unknown(shard, "last_offset", e),
        }
    }

    /// Offset of the last record stamped strictly before `timestamp`
    pub async fn offset_before(&self, shard: &ShardRef, timestamp: DateTime<Utc>) -> i64 {
        match self.broker.offset_for_time(shard, timestamp).await {
            // First at-or-after minus one; 0 - 1 is UNKNOWN already
            Ok(Some(offset)) => offset - 1,
            // Every record is older than `timestamp`
            Ok(None) => self.last_offset(shard).await,
            Err(e) => self.unknown(shard, "offset_before", e),
        }
    }

    /// Offset of the first record stamped at or after `timestamp`
    pub async fn offset_after_or_at(&self, shard: &ShardRef, timestamp: DateTime<Utc>) -> i64 {
        match self.broker.offset_for_time(shard, timestamp).await {
            Ok(Some(offset)) => offset,
            Ok(None) => UNKNOWN_OFFSET,
            Err(e) => self.unknown(shard, "offset_after_or_at", e),
        }
    }

    fn unknown(&self, shard: &ShardRef, query: &str, error: impl std::fmt::Display) -> i64 {
        tracing::warn!(
            shard = %shard,
            query = query,
            error = %error,
            "Shard metadata query failed, treating offset as unknown"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_metadata_unknown(query);
        }
        UNKNOWN_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryBroker;
    use chrono::{Duration, TimeZone};

    fn shard() -> ShardRef {
        ShardRef::new("test.widget.W-00000000000000000000000000000001", 0)
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    async fn broker_with_records(stamps: &[i64]) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        for m in stamps {
            broker.append(&shard(), "k", vec![], t(*m)).await.unwrap();
        }
        broker
    }

    #[tokio::test]
    async fn test_last_offset_of_empty_shard_is_unknown() {
        let provider = ShardMetadataProvider::new(Arc::new(InMemoryBroker::new()));
        assert_eq!(provider.last_offset(&shard()).await, UNKNOWN_OFFSET);
    }

    #[tokio::test]
    async fn test_last_offset() {
        let broker = broker_with_records(&[0, 10, 20]).await;
        let provider = ShardMetadataProvider::new(Arc::new(broker));
        assert_eq!(provider.last_offset(&shard()).await, 2);
    }

    #[tokio::test]
    async fn test_offset_before_subtracts_one() {
        let broker = broker_with_records(&[0, 10, 20]).await;
        let provider = ShardMetadataProvider::new(Arc::new(broker));

        assert_eq!(provider.offset_before(&shard(), t(0)).await, UNKNOWN_OFFSET);
        assert_eq!(provider.offset_before(&shard(), t(5)).await, 0);
        assert_eq!(provider.offset_before(&shard(), t(10)).await, 0);
        assert_eq!(provider.offset_before(&shard(), t(11)).await, 1);
        assert_eq!(provider.offset_before(&shard(), t(99)).await, 2);
    }

    #[tokio::test]
    async fn test_offset_after_or_at() {
        let broker = broker_with_records(&[0, 10, 20]).await;
        let provider = ShardMetadataProvider::new(Arc::new(broker));

        assert_eq!(provider.offset_after_or_at(&shard(), t(10)).await, 1);
        assert_eq!(provider.offset_after_or_at(&shard(), t(11)).await, 2);
        assert_eq!(provider.offset_after_or_at(&shard(), t(21)).await, UNKNOWN_OFFSET);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_unknown() {
        let broker = broker_with_records(&[0, 10]).await;
        broker.set_fail_metadata(true);
        let metrics = Arc::new(Metrics::new().unwrap());
        let provider = ShardMetadataProvider::new(Arc::new(broker)).with_metrics(metrics.clone());

        assert_eq!(provider.last_offset(&shard()).await, UNKNOWN_OFFSET);
        assert_eq!(provider.offset_before(&shard(), t(5)).await, UNKNOWN_OFFSET);
        assert_eq!(provider.offset_after_or_at(&shard(), t(5)).await, UNKNOWN_OFFSET);
        assert_eq!(
            metrics.metadata_unknown.with_label_values(&["last_offset"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_try_last_offset_reports_failures() {
        let broker = broker_with_records(&[0, 10]).await;
        let provider = ShardMetadataProvider::new(Arc::new(broker.clone()));
        assert_eq!(provider.try_last_offset(&shard()).await.unwrap(), 1);

        let empty = ShardRef::new("test.widget.W-00000000000000000000000000000002", 0);
        assert_eq!(provider.try_last_offset(&empty).await.unwrap(), UNKNOWN_OFFSET);

        broker.set_fail_metadata(true);
        assert!(matches!(
            provider.try_last_offset(&shard()).await,
            Err(BrokerError::Metadata(_))
        ));
    }
}
