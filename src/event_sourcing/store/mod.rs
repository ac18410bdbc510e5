// ============================================================================
// Stores on top of the log broker
// ============================================================================
//
// EventStore and SnapshotRepository own one exclusive stream per aggregate.
// EventPublisher writes to the shared per-type stream. AggregateRepository
// ties the three together for callers.
//
// ============================================================================

pub mod event_store;
pub mod publisher;
pub mod reader;
pub mod repository;
pub mod search;
pub mod snapshot_store;

pub use event_store::EventStore;
pub use publisher::EventPublisher;
pub use reader::RecordReader;
pub use repository::AggregateRepository;
pub use search::BinarySearchStrategy;
pub use snapshot_store::SnapshotRepository;
