use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::{BrokerError, LogBroker, LogCursor, LogRecord, SeekPosition};
use crate::event_sourcing::sharding::ShardRef;

// ============================================================================
// In-Memory Broker
// ============================================================================
//
// Offsets start at 0 and are contiguous per shard. Every cursor seek is
// recorded so tests can assert which offsets a lookup touched.
//
// ============================================================================

const DEFAULT_MAX_BATCH: usize = 100;

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    shards: RwLock<HashMap<ShardRef, Vec<LogRecord>>>,
    seeks: Mutex<Vec<(ShardRef, i64)>>,
    max_batch: usize,
    fail_metadata: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_max_batch(DEFAULT_MAX_BATCH)
    }

    /// Limit how many records a single poll returns
    pub fn with_max_batch(max_batch: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                shards: RwLock::new(HashMap::new()),
                seeks: Mutex::new(Vec::new()),
                max_batch: max_batch.max(1),
                fail_metadata: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Make end-offset and offset-for-time queries fail
    pub fn set_fail_metadata(&self, fail: bool) {
        self.inner.fail_metadata.store(fail, Ordering::SeqCst);
    }

    /// Make appends fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Offsets seeked on `shard`, in order
    pub async fn seeks_for(&self, shard: &ShardRef) -> Vec<i64> {
        self.inner
            .seeks
            .lock()
            .await
            .iter()
            .filter(|(s, _)| s == shard)
            .map(|(_, offset)| *offset)
            .collect()
    }

    pub async fn clear_seeks(&self) {
        self.inner.seeks.lock().await.clear();
    }

    pub async fn record_count(&self, shard: &ShardRef) -> usize {
        self.inner
            .shards
            .read()
            .await
            .get(shard)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn records(&self, shard: &ShardRef) -> Vec<LogRecord> {
        self.inner
            .shards
            .read()
            .await
            .get(shard)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn shards(&self) -> Vec<ShardRef> {
        let mut shards: Vec<ShardRef> = self.inner.shards.read().await.keys().cloned().collect();
        shards.sort();
        shards
    }
}

#[async_trait]
impl LogBroker for InMemoryBroker {
    async fn open_cursor(&self, shard: &ShardRef) -> Result<Box<dyn LogCursor>, BrokerError> {
        Ok(Box::new(InMemoryCursor {
            inner: self.inner.clone(),
            shard: shard.clone(),
            position: 0,
        }))
    }

    async fn end_offset(&self, shard: &ShardRef) -> Result<i64, BrokerError> {
        if self.inner.fail_metadata.load(Ordering::SeqCst) {
            return Err(BrokerError::Metadata(format!("injected failure for {}", shard)));
        }

        let shards = self.inner.shards.read().await;
        Ok(shards.get(shard).map(|r| r.len() as i64).unwrap_or(0))
    }

    async fn offset_for_time(
        &self,
        shard: &ShardRef,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<i64>, BrokerError> {
        if self.inner.fail_metadata.load(Ordering::SeqCst) {
            return Err(BrokerError::Metadata(format!("injected failure for {}", shard)));
        }

        let shards = self.inner.shards.read().await;
        Ok(shards.get(shard).and_then(|records| {
            records
                .iter()
                .find(|r| r.timestamp.map(|t| t >= timestamp).unwrap_or(false))
                .map(|r| r.offset)
        }))
    }

    async fn append(
        &self,
        shard: &ShardRef,
        key: &str,
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, BrokerError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(BrokerError::Write(format!("injected failure for {}", shard)));
        }

        let mut shards = self.inner.shards.write().await;
        let records = shards.entry(shard.clone()).or_default();
        let offset = records.len() as i64;
        records.push(LogRecord {
            offset,
            key: Some(key.to_string()),
            payload,
            timestamp: Some(timestamp),
        });
        Ok(offset)
    }
}

struct InMemoryCursor {
    inner: Arc<Inner>,
    shard: ShardRef,
    position: i64,
}

#[async_trait]
impl LogCursor for InMemoryCursor {
    async fn seek(&mut self, position: SeekPosition) -> Result<(), BrokerError> {
        self.position = match position {
            SeekPosition::Beginning => 0,
            SeekPosition::Offset(offset) if offset >= 0 => offset,
            SeekPosition::Offset(offset) => {
                return Err(BrokerError::Read(format!("invalid offset {} on {}", offset, self.shard)))
            }
        };
        self.inner
            .seeks
            .lock()
            .await
            .push((self.shard.clone(), self.position));
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> Result<Vec<LogRecord>, BrokerError> {
        let shards = self.inner.shards.read().await;
        let records = match shards.get(&self.shard) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };

        let start = (self.position.max(0) as usize).min(records.len());
        let end = (start + self.inner.max_batch).min(records.len());
        let batch = records[start..end].to_vec();
        self.position = end as i64;
        Ok(batch)
    }
}
