use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::core::{
    AggregateIdentity, AggregateRoot, Identifiable, StoreError, Version, Versioned,
};
use crate::event_sourcing::store::AggregateRepository;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: load → execute → save
//
// A concurrency conflict means another writer got there first. The whole
// cycle is retried with a fresh load, so the command is re-validated against
// the newer state. Business rule violations are never retried.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Command rejected: {0}")]
    Rejected(#[from] OrderError),
}

impl IsTransient for CommandError {
    fn is_transient(&self) -> bool {
        match self {
            CommandError::Store(e) => e.is_transient(),
            CommandError::Rejected(_) => false,
        }
    }
}

pub struct OrderCommandHandler {
    repository: Arc<AggregateRepository<OrderAggregate>>,
    retry: RetryConfig,
}

impl OrderCommandHandler {
    pub fn new(repository: Arc<AggregateRepository<OrderAggregate>>) -> Self {
        Self {
            repository,
            retry: RetryConfig::for_conflicts(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Create a new order; returns its identity and first version
    pub async fn create(
        &self,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> anyhow::Result<(AggregateIdentity, Version)> {
        let mut order =
            AggregateRoot::<OrderAggregate>::create_from_command(&command, self.repository.clock())?;
        order.correlate(correlation_id);

        let version = self.repository.save(&mut order).await?;

        tracing::info!(
            aggregate_id = %order.id(),
            version = %version,
            correlation_id = %correlation_id,
            "Order created"
        );

        Ok((order.id().clone(), version))
    }

    /// Apply a command to an existing order; returns the new version
    pub async fn handle(
        &self,
        aggregate_id: &AggregateIdentity,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> anyhow::Result<Version> {
        let command = &command;

        let version = retry_on_transient(self.retry.clone(), |attempt| async move {
            self.attempt(aggregate_id, command, correlation_id, attempt).await
        })
        .await
        .into_result()?;

        Ok(version)
    }

    async fn attempt(
        &self,
        aggregate_id: &AggregateIdentity,
        command: &OrderCommand,
        correlation_id: Uuid,
        attempt: u32,
    ) -> Result<Version, CommandError> {
        let mut order = self.repository.get_by_id(aggregate_id).await?;

        let produced = order.execute(command)?;
        if produced == 0 {
            return Ok(order.version());
        }
        order.correlate(correlation_id);

        let version = self.repository.save(&mut order).await?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            command = command.name(),
            version = %version,
            attempt = attempt,
            "Order command applied"
        );

        Ok(version)
    }
}
