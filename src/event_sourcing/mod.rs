// ============================================================================
// Log-native Event Sourcing
// ============================================================================
//
// core:      identities, versions, envelopes, snapshots, aggregate traits
// sharding:  identity -> (stream, partition) and shard offset queries
// store:     event store, snapshot repository, publisher, repository
// codec:     record bytes <-> values
//
// Nothing here knows about concrete aggregates; see src/domain/.
//
// ============================================================================

pub mod codec;
pub mod core;
pub mod sharding;
pub mod store;

// Re-export core infrastructure
pub use codec::{JsonCodec, RecordCodec};
pub use core::*;
pub use sharding::{ShardMetadataProvider, ShardRef, ShardingStrategy, UNKNOWN_OFFSET};
pub use store::*;
