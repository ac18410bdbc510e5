use std::sync::Arc;
use std::time::Duration;

use crate::event_sourcing::codec::RecordCodec;
use crate::event_sourcing::core::{AggregateIdentity, Result, StoreError};
use crate::event_sourcing::sharding::ShardRef;
use crate::messaging::LogCursor;
use crate::metrics::Metrics;

use super::event_store::io_failure;

/// Batched, key-filtered reads from an already positioned cursor
pub struct RecordReader<T> {
    codec: Arc<dyn RecordCodec<T>>,
    poll_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<T> Clone for RecordReader<T> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            poll_timeout: self.poll_timeout,
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> RecordReader<T> {
    pub fn new(codec: Arc<dyn RecordCodec<T>>, poll_timeout: Duration) -> Self {
        Self {
            codec,
            poll_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Collect records keyed by `identity`, in offset order, until `limit`
    /// records are found or the tail is reached. Returns `(offset, record)`.
    pub async fn read(
        &self,
        cursor: &mut dyn LogCursor,
        shard: &ShardRef,
        identity: &AggregateIdentity,
        limit: Option<usize>,
    ) -> Result<Vec<(i64, T)>> {
        let mut out = Vec::new();
        if limit == Some(0) {
            return Ok(out);
        }

        loop {
            let batch = cursor
                .poll(self.poll_timeout)
                .await
                .map_err(|e| io_failure(shard, "poll", e))?;

            if batch.is_empty() {
                break;
            }

            for record in batch {
                if record.key.as_deref() != Some(identity.as_str()) {
                    continue;
                }

                let decoded = self.codec.decode(&record.payload).map_err(|source| {
                    tracing::error!(
                        shard = %shard,
                        offset = record.offset,
                        kind = source.kind(),
                        error = %source,
                        "Failed to decode record"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_decode_failure(source.kind());
                    }
                    StoreError::Decode {
                        shard: shard.clone(),
                        offset: record.offset,
                        source,
                    }
                })?;

                out.push((record.offset, decoded));
                if limit.map(|l| out.len() >= l).unwrap_or(false) {
                    return Ok(out);
                }
            }
        }

        tracing::debug!(shard = %shard, records = out.len(), "Read reached tail");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::codec::JsonCodec;
    use crate::event_sourcing::core::DecodeError;
    use crate::messaging::{BrokerError, InMemoryBroker, LogBroker, LogRecord, SeekPosition};
    use async_trait::async_trait;
    use chrono::Utc;

    /// Hands out one batch, then loses its connection
    struct DroppingCursor {
        batch: Option<Vec<LogRecord>>,
    }

    #[async_trait]
    impl LogCursor for DroppingCursor {
        async fn seek(&mut self, _position: SeekPosition) -> std::result::Result<(), BrokerError> {
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> std::result::Result<Vec<LogRecord>, BrokerError> {
            self.batch
                .take()
                .ok_or_else(|| BrokerError::Connection("connection reset".into()))
        }
    }

    const ID: &str = "test.widget.W-00000000000000000000000000000001";
    const OTHER: &str = "test.widget.W-00000000000000000000000000000002";

    fn shard() -> ShardRef {
        ShardRef::new(ID, 0)
    }

    fn reader() -> RecordReader<u32> {
        RecordReader::new(Arc::new(JsonCodec::<u32>::new()), Duration::from_millis(10))
    }

    async fn seeded(broker: &InMemoryBroker, entries: &[(&str, &str)]) {
        for (key, payload) in entries {
            broker
                .append(&shard(), key, payload.as_bytes().to_vec(), Utc::now())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_reads_matching_keys_across_batches() {
        let broker = InMemoryBroker::with_max_batch(2);
        seeded(&broker, &[(ID, "1"), (OTHER, "99"), (ID, "2"), (ID, "3"), (OTHER, "98")]).await;

        let mut cursor = broker.open_cursor(&shard()).await.unwrap();
        cursor.seek(SeekPosition::Beginning).await.unwrap();

        let id = AggregateIdentity::parse(ID).unwrap();
        let records = reader().read(cursor.as_mut(), &shard(), &id, None).await.unwrap();
        assert_eq!(records, vec![(0, 1), (2, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn test_stops_at_limit() {
        let broker = InMemoryBroker::new();
        seeded(&broker, &[(ID, "1"), (ID, "2"), (ID, "3")]).await;

        let mut cursor = broker.open_cursor(&shard()).await.unwrap();
        cursor.seek(SeekPosition::Offset(1)).await.unwrap();

        let id = AggregateIdentity::parse(ID).unwrap();
        let records = reader().read(cursor.as_mut(), &shard(), &id, Some(1)).await.unwrap();
        assert_eq!(records, vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_empty_shard_reads_nothing() {
        let broker = InMemoryBroker::new();
        let mut cursor = broker.open_cursor(&shard()).await.unwrap();
        cursor.seek(SeekPosition::Beginning).await.unwrap();

        let id = AggregateIdentity::parse(ID).unwrap();
        let records = reader().read(cursor.as_mut(), &shard(), &id, Some(1)).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal_and_counted() {
        let broker = InMemoryBroker::new();
        seeded(&broker, &[(ID, "1"), (ID, "{broken")]).await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let reader = reader().with_metrics(Some(metrics.clone()));

        let mut cursor = broker.open_cursor(&shard()).await.unwrap();
        cursor.seek(SeekPosition::Beginning).await.unwrap();

        let id = AggregateIdentity::parse(ID).unwrap();
        let err = reader.read(cursor.as_mut(), &shard(), &id, None).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Decode {
                offset: 1,
                source: DecodeError::Corrupt(_),
                ..
            }
        ));
        assert_eq!(metrics.decode_failures.with_label_values(&["corrupt"]).get(), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_surfaces_as_broker_error() {
        let mut cursor = DroppingCursor {
            batch: Some(vec![LogRecord {
                offset: 0,
                key: Some(ID.to_string()),
                payload: b"1".to_vec(),
                timestamp: Some(Utc::now()),
            }]),
        };

        let id = AggregateIdentity::parse(ID).unwrap();
        let err = reader().read(&mut cursor, &shard(), &id, None).await.unwrap_err();
        match err {
            StoreError::Broker { shard: failed, source } => {
                assert_eq!(failed, shard());
                assert!(matches!(source, BrokerError::Connection(_)));
            }
            other => panic!("expected broker error, got {:?}", other),
        }
    }
}
