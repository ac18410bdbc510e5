use crate::event_sourcing::sharding::ShardRef;
use crate::messaging::BrokerError;
use crate::utils::IsTransient;

use super::identity::AggregateIdentity;
use super::version::Version;

// ============================================================================
// Store Errors
// ============================================================================
//
// Validation errors are caller bugs and fail fast. Concurrency conflicts are
// handed back to the caller for retry-with-reload. Unknown offsets are not
// errors at all (see ShardMetadataProvider). Decode failures distinguish
// corrupt bytes from payload types this build does not know.
//
// ============================================================================

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed aggregate identity {value:?}: {reason}")]
    MalformedIdentity { value: String, reason: String },

    #[error("Cannot append an empty change set")]
    EmptyChangeSet,

    #[error("Missing required version: {0}")]
    MissingVersion(String),

    #[error("Cannot snapshot {id} with {pending} uncommitted change(s)")]
    PendingChanges { id: String, pending: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Corrupt record payload: {0}")]
    Corrupt(String),

    #[error("Unknown payload type: {0}")]
    UnknownType(String),
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Corrupt(_) => "corrupt",
            DecodeError::UnknownType(_) => "unknown_type",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Concurrency conflict on {shard}: current offset {current}, expected {expected}")]
    ConcurrencyConflict {
        shard: ShardRef,
        current: i64,
        expected: Version,
    },

    #[error("Failed to decode record at {shard} offset {offset}: {source}")]
    Decode {
        shard: ShardRef,
        offset: i64,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to encode record: {0}")]
    Encode(String),

    #[error("Broker I/O failed on {shard}: {source}")]
    Broker {
        shard: ShardRef,
        #[source]
        source: BrokerError,
    },

    #[error("Aggregate not found: {0}")]
    NotFound(AggregateIdentity),

    #[error("Failed to reconstruct aggregate {id}: {message}")]
    Reconstruction { id: AggregateIdentity, message: String },
}

impl StoreError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    pub(crate) fn broker(shard: &ShardRef, source: BrokerError) -> Self {
        StoreError::Broker {
            shard: shard.clone(),
            source,
        }
    }
}

/// Conflicts clear up after a reload; a tripped breaker or a failed
/// write may clear up after a pause. Everything else is permanent.
impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::ConcurrencyConflict { .. } => true,
            StoreError::Broker { source, .. } => matches!(
                source,
                BrokerError::CircuitOpen | BrokerError::Write(_) | BrokerError::Connection(_)
            ),
            _ => false,
        }
    }
}
