// ============================================================================
// Sharding - maps an aggregate identity to a physical log coordinate
// ============================================================================
//
// Strategies (selected by the store's role):
// - EventStore:     <identity>               partition 0  (exclusive stream)
// - SnapshotStore:  <identity><suffix>       partition 0  (exclusive stream)
// - EventPublishing <domain>.<object_type>   partition murmur2(identity) % N
//
// Shard references are never persisted; they are recomputed on every access.
//
// ============================================================================

mod metadata;

pub use metadata::{ShardMetadataProvider, UNKNOWN_OFFSET};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event_sourcing::core::AggregateIdentity;

pub const DEFAULT_SNAPSHOT_SUFFIX: &str = ".snapshots";
pub const DEFAULT_PUBLISH_PARTITIONS: u32 = 10;

/// Physical coordinate: stream name + partition index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardRef {
    pub stream: String,
    pub partition: i32,
}

impl ShardRef {
    pub fn new(stream: impl Into<String>, partition: i32) -> Self {
        Self {
            stream: stream.into(),
            partition,
        }
    }
}

impl fmt::Display for ShardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.stream, self.partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardingStrategy {
    /// One exclusive single-partition stream per aggregate
    EventStore,
    /// Like EventStore, in a separate namespace
    SnapshotStore { suffix: String },
    /// Shared stream per aggregate type, fanned out over `partitions`.
    /// Order holds per aggregate key only.
    EventPublishing { partitions: u32 },
}

impl ShardingStrategy {
    pub fn snapshot_store() -> Self {
        ShardingStrategy::SnapshotStore {
            suffix: DEFAULT_SNAPSHOT_SUFFIX.to_string(),
        }
    }

    pub fn event_publishing() -> Self {
        ShardingStrategy::EventPublishing {
            partitions: DEFAULT_PUBLISH_PARTITIONS,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ShardingStrategy::EventStore => "events",
            ShardingStrategy::SnapshotStore { .. } => "snapshots",
            ShardingStrategy::EventPublishing { .. } => "publishing",
        }
    }

    pub fn shard_for(&self, id: &AggregateIdentity) -> ShardRef {
        match self {
            ShardingStrategy::EventStore => ShardRef::new(id.as_str(), 0),
            ShardingStrategy::SnapshotStore { suffix } => {
                ShardRef::new(format!("{}{}", id.as_str(), suffix), 0)
            }
            ShardingStrategy::EventPublishing { partitions } => {
                let partitions = (*partitions).max(1);
                let hash = to_positive(murmur2(id.as_str().as_bytes()));
                ShardRef::new(
                    format!("{}.{}", id.domain(), id.object_type()),
                    (hash % partitions) as i32,
                )
            }
        }
    }
}

/// Kafka's default partitioner hash (murmur2, seed 0x9747b28c)
fn murmur2(data: &[u8]) -> i32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let length = data.len();
    let mut h: u32 = SEED ^ (length as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let rest = chunks.remainder();
    if rest.len() >= 3 {
        h ^= (rest[2] as u32) << 16;
    }
    if rest.len() >= 2 {
        h ^= (rest[1] as u32) << 8;
    }
    if !rest.is_empty() {
        h ^= rest[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h as i32
}

fn to_positive(hash: i32) -> u32 {
    (hash & 0x7fff_ffff) as u32
}

// ============================================================================
// Unit Tests
// ============================================================================
