// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// GENERIC, reusable event sourcing types that work with ANY aggregate:
// identities, versions, envelopes, snapshots, the aggregate contract, the
// clock and the error taxonomy.
//
// ============================================================================

pub mod aggregate;
pub mod clock;
pub mod errors;
pub mod event;
pub mod identity;
pub mod snapshot;
pub mod version;

// Re-export core types for convenience
pub use aggregate::{Aggregate, AggregateRoot, EventApplier, Identifiable, Snapshottable, Versioned};
pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{DecodeError, Result, StoreError, ValidationError};
pub use event::{DomainEvent, EventEnvelope, EventStream};
pub use identity::AggregateIdentity;
pub use snapshot::Snapshot;
pub use version::Version;
