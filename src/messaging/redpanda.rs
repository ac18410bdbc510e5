use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::{
    config::ClientConfig,
    consumer::{BaseConsumer, Consumer, StreamConsumer},
    error::KafkaError,
    message::Message,
    producer::{FutureProducer, FutureRecord},
    topic_partition_list::{Offset, TopicPartitionList},
    util::Timeout,
};
use std::time::Duration;

use super::{BrokerError, LogBroker, LogCursor, LogRecord, SeekPosition};
use crate::event_sourcing::sharding::ShardRef;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda / Kafka Broker
// ============================================================================
//
// - Writes share one long-lived FutureProducer guarded by a circuit breaker.
// - Every read opens its own StreamConsumer assigned to exactly one
//   partition; dropping the cursor closes it.
// - Metadata queries create a throwaway BaseConsumer on a blocking thread and
//   drop it as soon as the query returns.
//
// Topics are expected to be auto-created on first write (Redpanda's
// auto_create_topics_enabled) with a single partition, except the
// publishing topics which need `publish_partitions` partitions.
//
// ============================================================================

const MAX_BATCH: usize = 500;
const READER_GROUP_ID: &str = "redpanda-es-reader";

#[derive(Clone, Debug)]
pub struct RedpandaConfig {
    pub brokers: String,
    pub message_timeout: Duration,
    pub metadata_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl RedpandaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            message_timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.message_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true");
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", READER_GROUP_ID)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "true")
            .set("auto.offset.reset", "earliest");
        config
    }
}

pub struct RedpandaBroker {
    producer: FutureProducer,
    config: RedpandaConfig,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaBroker {
    pub fn new(config: RedpandaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| BrokerError::Connection(format!("Failed to create Redpanda producer: {}", e)))?;

        tracing::info!(brokers = %config.brokers, "Connected to Redpanda");

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda-writes", config.circuit_breaker.clone()),
            config,
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    pub async fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset().await;
    }

    /// Run a metadata query on a short-lived consumer
    async fn with_metadata_consumer<T, F>(&self, query: F) -> Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> Result<T, KafkaError> + Send + 'static,
    {
        let config = self.config.consumer_config();
        let timeout = self.config.metadata_timeout;

        tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = config
                .create()
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
            query(&consumer, timeout).map_err(|e| BrokerError::Metadata(e.to_string()))
        })
        .await
        .map_err(|e| BrokerError::Metadata(format!("metadata task failed: {}", e)))?
    }
}

#[async_trait]
impl LogBroker for RedpandaBroker {
    async fn open_cursor(&self, shard: &ShardRef) -> Result<Box<dyn LogCursor>, BrokerError> {
        let consumer: StreamConsumer = self
            .config
            .consumer_config()
            .create()
            .map_err(|e| BrokerError::Connection(format!("Failed to create Redpanda consumer: {}", e)))?;

        Ok(Box::new(RedpandaCursor {
            consumer,
            shard: shard.clone(),
        }))
    }

    async fn end_offset(&self, shard: &ShardRef) -> Result<i64, BrokerError> {
        let topic = shard.stream.clone();
        let partition = shard.partition;

        let (_low, high) = self
            .with_metadata_consumer(move |consumer, timeout| {
                consumer.fetch_watermarks(&topic, partition, timeout)
            })
            .await?;

        Ok(high)
    }

    async fn offset_for_time(
        &self,
        shard: &ShardRef,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<i64>, BrokerError> {
        let topic = shard.stream.clone();
        let partition = shard.partition;
        let millis = timestamp.timestamp_millis();

        self.with_metadata_consumer(move |consumer, timeout| {
            let mut request = TopicPartitionList::new();
            request.add_partition_offset(&topic, partition, Offset::Offset(millis))?;

            let response = consumer.offsets_for_times(request, timeout)?;
            Ok(response
                .find_partition(&topic, partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(offset) if offset >= 0 => Some(offset),
                    _ => None,
                }))
        })
        .await
    }

    async fn append(
        &self,
        shard: &ShardRef,
        key: &str,
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, BrokerError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&shard.stream)
                    .partition(shard.partition)
                    .key(key)
                    .payload(&payload)
                    .timestamp(timestamp.timestamp_millis());

                self.producer
                    .send(record, Timeout::After(self.config.message_timeout))
                    .await
                    .map(|(_partition, offset)| offset)
                    .map_err(|(e, _)| BrokerError::Write(format!("Kafka send error: {}", e)))
            })
            .await;

        match result {
            Ok(offset) => {
                tracing::debug!(shard = %shard, key = %key, offset, "Appended record to Redpanda");
                Ok(offset)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(shard = %shard, "Circuit breaker open - Redpanda unavailable");
                Err(BrokerError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, shard = %shard, "Failed to append to Redpanda");
                Err(e)
            }
        }
    }
}

struct RedpandaCursor {
    consumer: StreamConsumer,
    shard: ShardRef,
}

impl RedpandaCursor {
    /// `None` on tail (EOF or timeout)
    async fn next_record(&self, timeout: Duration) -> Result<Option<LogRecord>, BrokerError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(KafkaError::PartitionEOF(_))) => Ok(None),
            Ok(Err(e)) => Err(BrokerError::Read(e.to_string())),
            Ok(Ok(message)) => Ok(Some(LogRecord {
                offset: message.offset(),
                key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                timestamp: message
                    .timestamp()
                    .to_millis()
                    .and_then(DateTime::from_timestamp_millis),
            })),
        }
    }
}

#[async_trait]
impl LogCursor for RedpandaCursor {
    async fn seek(&mut self, position: SeekPosition) -> Result<(), BrokerError> {
        let offset = match position {
            SeekPosition::Beginning => Offset::Beginning,
            SeekPosition::Offset(offset) => Offset::Offset(offset),
        };

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&self.shard.stream, self.shard.partition, offset)
            .map_err(|e| BrokerError::Read(e.to_string()))?;
        self.consumer
            .assign(&assignment)
            .map_err(|e| BrokerError::Read(format!("Failed to assign {}: {}", self.shard, e)))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<LogRecord>, BrokerError> {
        let mut batch = Vec::new();

        while batch.len() < MAX_BATCH {
            match self.next_record(timeout).await? {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        Ok(batch)
    }
}
