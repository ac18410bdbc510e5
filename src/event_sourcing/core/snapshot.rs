use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ValidationError;
use super::identity::AggregateIdentity;
use super::version::Version;

/// Materialized aggregate state at a committed version.
///
/// Append-only: a snapshot is written once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub snapshot_id: Uuid,
    pub aggregate_id: AggregateIdentity,
    pub timestamp: DateTime<Utc>,
    pub version: Version,
    pub state: S,
}

impl<S> Snapshot<S> {
    pub fn new(
        aggregate_id: AggregateIdentity,
        version: Version,
        state: S,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if version.is_none() {
            return Err(ValidationError::MissingVersion(format!(
                "snapshot of {} has no committed version",
                aggregate_id
            )));
        }

        Ok(Self {
            snapshot_id: Uuid::new_v4(),
            aggregate_id,
            timestamp,
            version,
            state,
        })
    }
}
