// ============================================================================
// Messaging - the partitioned append-only log the store is built on
// ============================================================================
//
// Any broker offering named partitioned streams, monotonic per-partition
// offsets, seekable cursors, end-offset and offset-for-time lookups can back
// the store:
//
// - RedpandaBroker  (rdkafka, feature "kafka")
// - InMemoryBroker  (tests and offline demo)
//
// ============================================================================

pub mod memory;
#[cfg(feature = "kafka")]
pub mod redpanda;

pub use memory::InMemoryBroker;
#[cfg(feature = "kafka")]
pub use redpanda::{RedpandaBroker, RedpandaConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::event_sourcing::sharding::ShardRef;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Metadata query failed: {0}")]
    Metadata(String),

    #[error("Circuit breaker open")]
    CircuitOpen,
}

/// One record as stored in a shard
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    Beginning,
    Offset(i64),
}

/// Read cursor scoped to a single shard. Dropping it releases the connection.
#[async_trait]
pub trait LogCursor: Send {
    async fn seek(&mut self, position: SeekPosition) -> Result<(), BrokerError>;

    /// Next batch of records in offset order. An empty batch means the cursor
    /// reached the tail of the shard.
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<LogRecord>, BrokerError>;
}

#[async_trait]
pub trait LogBroker: Send + Sync {
    /// Open a short-lived read cursor on one shard
    async fn open_cursor(&self, shard: &ShardRef) -> Result<Box<dyn LogCursor>, BrokerError>;

    /// Offset the next appended record will receive (0 for an empty shard)
    async fn end_offset(&self, shard: &ShardRef) -> Result<i64, BrokerError>;

    /// Offset of the first record stamped at or after `timestamp`,
    /// `None` when every record is older
    async fn offset_for_time(
        &self,
        shard: &ShardRef,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<i64>, BrokerError>;

    /// Append one keyed record; returns its offset
    async fn append(
        &self,
        shard: &ShardRef,
        key: &str,
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, BrokerError>;
}
