use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::event_sourcing::core::{Aggregate, Clock};
use crate::event_sourcing::sharding::{DEFAULT_PUBLISH_PARTITIONS, DEFAULT_SNAPSHOT_SUFFIX};
use crate::event_sourcing::store::{AggregateRepository, EventPublisher, EventStore, SnapshotRepository};
use crate::messaging::LogBroker;
use crate::metrics::Metrics;
use crate::utils::CircuitBreakerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "redpanda-es";
pub const CONFIG_ENV_PREFIX: &str = "REDPANDA_ES";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            timeout_ms: defaults.timeout.as_millis() as u64,
            success_threshold: defaults.success_threshold,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            timeout: Duration::from_millis(settings.timeout_ms),
            success_threshold: settings.success_threshold,
        }
    }
}

/// Store settings.
///
/// Sources, later overriding earlier:
/// 1. `redpanda-es.yaml` in the working directory (optional)
/// 2. the file passed to `load` (required when given)
/// 3. `REDPANDA_ES__*` environment variables, `__` separating nested keys
///    (e.g. `REDPANDA_ES__CIRCUIT_BREAKER__FAILURE_THRESHOLD=3`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub brokers: String,
    pub message_timeout_ms: u64,
    pub poll_timeout_ms: u64,
    pub metadata_timeout_ms: u64,
    /// Partitions of each publishing stream; 0 disables publishing
    pub publish_partitions: u32,
    pub snapshot_suffix: String,
    /// Snapshot every N committed events; 0 disables automatic snapshots
    pub snapshot_interval: u64,
    pub metrics_port: u16,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".to_string(),
            message_timeout_ms: 5_000,
            poll_timeout_ms: 500,
            metadata_timeout_ms: 5_000,
            publish_partitions: DEFAULT_PUBLISH_PARTITIONS,
            snapshot_suffix: DEFAULT_SNAPSHOT_SUFFIX.to_string(),
            snapshot_interval: 0,
            metrics_port: 9090,
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl StoreConfig {
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[cfg(feature = "kafka")]
    pub fn redpanda(&self) -> crate::messaging::RedpandaConfig {
        let mut config = crate::messaging::RedpandaConfig::new(self.brokers.clone());
        config.message_timeout = Duration::from_millis(self.message_timeout_ms);
        config.metadata_timeout = Duration::from_millis(self.metadata_timeout_ms);
        config.circuit_breaker = CircuitBreakerConfig::from(&self.circuit_breaker);
        config
    }

    /// Repository for `A` wired according to these settings
    pub fn repository<A: Aggregate>(
        &self,
        broker: Arc<dyn LogBroker>,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<Metrics>>,
    ) -> AggregateRepository<A> {
        let events = EventStore::new(broker.clone()).with_poll_timeout(self.poll_timeout());
        let snapshots = SnapshotRepository::new(broker.clone())
            .with_suffix(self.snapshot_suffix.clone())
            .with_poll_timeout(self.poll_timeout());

        let mut repository = AggregateRepository::new(events, snapshots, clock)
            .with_snapshot_interval(self.snapshot_interval);

        if self.publish_partitions > 0 {
            repository = repository
                .with_publisher(EventPublisher::new(broker).with_partitions(self.publish_partitions));
        }

        match metrics {
            Some(metrics) => repository.with_metrics(metrics),
            None => repository,
        }
    }
}
