use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use redpanda_es::domain::order::{OrderAggregate, OrderCommand, OrderCommandHandler, OrderItem};
use redpanda_es::event_sourcing::{Clock, Identifiable, SystemClock, Version, Versioned};
use redpanda_es::messaging::{InMemoryBroker, LogBroker};
use redpanda_es::metrics::{self, Metrics};
use redpanda_es::StoreConfig;

// Usage: redpanda-es-demo [config.yaml] [--in-memory]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,redpanda_es=debug")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let in_memory = args.iter().any(|a| a == "--in-memory");
    let config_path = args.iter().find(|a| !a.starts_with("--")).map(String::as_str);

    let config = StoreConfig::load(config_path)?;
    tracing::info!(brokers = %config.brokers, in_memory, "Starting event store demo");

    // === 1. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    let registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let served = actix_web::rt::System::new()
            .block_on(metrics::start_metrics_server(registry, metrics_port));
        if let Err(e) = served {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    // === 2. Broker ===
    let broker = connect(&config, in_memory)?;

    // === 3. Repository + command handler ===
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository = Arc::new(config.repository::<OrderAggregate>(
        broker,
        clock.clone(),
        Some(metrics.clone()),
    ));
    let handler = OrderCommandHandler::new(repository.clone());

    // === 4. Order lifecycle ===
    let correlation_id = Uuid::new_v4();
    let (order_id, _) = handler
        .create(
            OrderCommand::CreateOrder {
                customer_id: Uuid::new_v4(),
                items: vec![
                    OrderItem::new(Uuid::new_v4(), 2),
                    OrderItem::new(Uuid::new_v4(), 1),
                ],
            },
            correlation_id,
        )
        .await?;

    handler
        .handle(
            &order_id,
            OrderCommand::UpdateItems {
                items: vec![OrderItem::new(Uuid::new_v4(), 5)],
                reason: Some("Customer changed basket".to_string()),
            },
            correlation_id,
        )
        .await?;
    handler
        .handle(&order_id, OrderCommand::ConfirmOrder, correlation_id)
        .await?;

    // Baseline for the point-in-time read below
    let confirmed_at = clock.now();

    let order = repository.get_by_id(&order_id).await?;
    repository.snapshot(&order).await?;

    handler
        .handle(
            &order_id,
            OrderCommand::ShipOrder {
                tracking_number: "TRACK-0042".to_string(),
                carrier: "UPS".to_string(),
            },
            correlation_id,
        )
        .await?;

    // === 5. Reads ===
    let current = repository.get_by_id(&order_id).await?;
    tracing::info!(
        aggregate_id = %current.id(),
        version = %current.version(),
        status = ?current.state().status,
        "Current order state"
    );

    let first = repository.get_at_version(&order_id, Version::from_offset(0)).await?;
    tracing::info!(
        version = %first.version(),
        items = first.state().items.len(),
        "Order as first created"
    );

    let as_of = repository.get_as_of(&order_id, confirmed_at).await?;
    tracing::info!(
        version = %as_of.version(),
        status = ?as_of.state().status,
        "Order as of confirmation"
    );

    tracing::info!(
        metric_families = metrics.registry().gather().len(),
        "Demo complete"
    );

    Ok(())
}

#[cfg(feature = "kafka")]
fn connect(config: &StoreConfig, in_memory: bool) -> anyhow::Result<Arc<dyn LogBroker>> {
    if in_memory {
        return Ok(Arc::new(InMemoryBroker::new()));
    }
    let broker = redpanda_es::messaging::RedpandaBroker::new(config.redpanda())?;
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "kafka"))]
fn connect(_config: &StoreConfig, _in_memory: bool) -> anyhow::Result<Arc<dyn LogBroker>> {
    tracing::warn!("Built without the kafka feature, using the in-memory broker");
    Ok(Arc::new(InMemoryBroker::new()))
}
