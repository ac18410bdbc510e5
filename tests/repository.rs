use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use redpanda_es::domain::order::{OrderAggregate, OrderCommand, OrderItem, OrderStatus};
use redpanda_es::event_sourcing::{
    AggregateIdentity, AggregateRepository, AggregateRoot, Clock, EventPublisher, EventStore,
    FixedClock, Identifiable, ShardingStrategy, SnapshotRepository, StoreError, ValidationError,
    Version, Versioned,
};
use redpanda_es::messaging::InMemoryBroker;
use redpanda_es::metrics::Metrics;

struct Fixture {
    broker: InMemoryBroker,
    clock: Arc<FixedClock>,
    repository: AggregateRepository<OrderAggregate>,
}

fn fixture(snapshot_interval: u64) -> Fixture {
    let broker = InMemoryBroker::new();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ));
    let poll = Duration::from_millis(10);

    let repository = AggregateRepository::new(
        EventStore::new(Arc::new(broker.clone())).with_poll_timeout(poll),
        SnapshotRepository::new(Arc::new(broker.clone())).with_poll_timeout(poll),
        clock.clone(),
    )
    .with_snapshot_interval(snapshot_interval);

    Fixture {
        broker,
        clock,
        repository,
    }
}

fn create_command() -> OrderCommand {
    OrderCommand::CreateOrder {
        customer_id: Uuid::new_v4(),
        items: vec![OrderItem::new(Uuid::new_v4(), 2)],
    }
}

fn update_command(quantity: i32) -> OrderCommand {
    OrderCommand::UpdateItems {
        items: vec![OrderItem::new(Uuid::new_v4(), quantity)],
        reason: None,
    }
}

/// create, update, confirm, ship; one minute apart
async fn full_history(f: &Fixture) -> AggregateIdentity {
    let mut order =
        AggregateRoot::<OrderAggregate>::create_from_command(&create_command(), f.repository.clock())
            .unwrap();
    f.repository.save(&mut order).await.unwrap();

    let commands = [
        update_command(7),
        OrderCommand::ConfirmOrder,
        OrderCommand::ShipOrder {
            tracking_number: "TRACK-1".to_string(),
            carrier: "DHL".to_string(),
        },
    ];
    for command in commands.iter() {
        f.clock.advance(ChronoDuration::minutes(1));
        order.execute(command).unwrap();
        f.repository.save(&mut order).await.unwrap();
    }

    order.id().clone()
}

#[tokio::test]
async fn test_snapshot_plus_tail_matches_full_replay() {
    let f = fixture(0);
    let id = full_history(&f).await;

    let replayed = f.repository.get_by_id(&id).await.unwrap();
    assert_eq!(replayed.version().value(), 3);

    // Snapshot mid-history, then compare
    let midway = f.repository.get_at_version(&id, Version::from_offset(1)).await.unwrap();
    f.repository.snapshot(&midway).await.unwrap();

    let from_snapshot = f.repository.get_by_id(&id).await.unwrap();
    assert_eq!(from_snapshot.version(), replayed.version());
    assert_eq!(from_snapshot.state(), replayed.state());
    assert_eq!(from_snapshot.state().status, OrderStatus::Shipped);
}

#[tokio::test]
async fn test_snapshots_follow_the_configured_interval() {
    let f = fixture(2);
    let id = full_history(&f).await;

    let shard = f.repository.snapshot_repository().shard_for(&id);
    assert_eq!(f.broker.record_count(&shard).await, 2);

    let latest = f.repository.snapshot_repository().latest(&id).await.unwrap().unwrap();
    assert_eq!(latest.version.value(), 3);

    let earlier = f
        .repository
        .snapshot_repository()
        .latest_before_version(&id, Version::from_offset(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(earlier.version.value(), 1);
}

#[tokio::test]
async fn test_historical_version_reads() {
    let f = fixture(2);
    let id = full_history(&f).await;

    let first = f.repository.get_at_version(&id, Version::from_offset(0)).await.unwrap();
    assert_eq!(first.version().value(), 0);
    assert_eq!(first.state().status, OrderStatus::Created);
    assert_eq!(first.state().total_quantity(), 2);

    let confirmed = f.repository.get_at_version(&id, Version::from_offset(2)).await.unwrap();
    assert_eq!(confirmed.version().value(), 2);
    assert_eq!(confirmed.state().status, OrderStatus::Confirmed);
    assert_eq!(confirmed.state().total_quantity(), 7);

    let err = f.repository.get_at_version(&id, Version::NONE).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_point_in_time_reads() {
    let f = fixture(2);
    let start = f.clock.now();
    let id = full_history(&f).await;

    // Events at start, +1m, +2m, +3m; the bound is exclusive
    let before_confirm = f
        .repository
        .get_as_of(&id, start + ChronoDuration::minutes(2))
        .await
        .unwrap();
    assert_eq!(before_confirm.version().value(), 1);
    assert_eq!(before_confirm.state().status, OrderStatus::Created);
    assert_eq!(before_confirm.state().total_quantity(), 7);

    let just_after = f
        .repository
        .get_as_of(&id, start + ChronoDuration::seconds(150))
        .await
        .unwrap();
    assert_eq!(just_after.version().value(), 2);
    assert_eq!(just_after.state().status, OrderStatus::Confirmed);

    let err = f.repository.get_as_of(&id, start).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_committed_events_are_published_by_aggregate_type() {
    let f = fixture(0);
    let repository = AggregateRepository::<OrderAggregate>::from_broker(
        Arc::new(f.broker.clone()),
        f.clock.clone(),
    )
    .with_publisher(EventPublisher::new(Arc::new(f.broker.clone())).with_partitions(4));

    let mut order =
        AggregateRoot::<OrderAggregate>::create_from_command(&create_command(), repository.clock())
            .unwrap();
    order.execute(&OrderCommand::ConfirmOrder).unwrap();
    repository.save(&mut order).await.unwrap();

    let shard = ShardingStrategy::EventPublishing { partitions: 4 }.shard_for(order.id());
    assert_eq!(shard.stream, "sales.order");

    let records = f.broker.records(&shard).await;
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.key.as_deref() == Some(order.id().as_str())));
}

#[tokio::test]
async fn test_stale_save_is_rejected_and_keeps_pending_changes() {
    let f = fixture(0);
    let metrics = Arc::new(Metrics::new().unwrap());
    let repository = AggregateRepository::<OrderAggregate>::from_broker(
        Arc::new(f.broker.clone()),
        f.clock.clone(),
    )
    .with_metrics(metrics.clone());

    let mut order =
        AggregateRoot::<OrderAggregate>::create_from_command(&create_command(), repository.clock())
            .unwrap();
    repository.save(&mut order).await.unwrap();

    let mut first = repository.get_by_id(order.id()).await.unwrap();
    let mut second = repository.get_by_id(order.id()).await.unwrap();

    first.execute(&update_command(3)).unwrap();
    repository.save(&mut first).await.unwrap();

    second.execute(&OrderCommand::ConfirmOrder).unwrap();
    let err = repository.save(&mut second).await.unwrap_err();

    assert!(err.is_concurrency_conflict());
    assert!(second.has_pending_changes());
    assert_eq!(second.version().value(), 0);
    assert_eq!(metrics.concurrency_conflicts.get(), 1);
    assert_eq!(repository.event_store().current_version(order.id()).await.value(), 1);
}

#[tokio::test]
async fn test_saving_without_changes_is_rejected() {
    let f = fixture(0);
    let id = full_history(&f).await;

    let mut order = f.repository.get_by_id(&id).await.unwrap();
    let err = f.repository.save(&mut order).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::EmptyChangeSet)
    ));
}

#[tokio::test]
async fn test_unknown_aggregate_is_not_found() {
    let f = fixture(0);
    let id = AggregateIdentity::generate("sales", "order", "ORD").unwrap();

    assert!(!f.repository.exists(&id).await);
    assert!(matches!(
        f.repository.get_by_id(&id).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_snapshot_with_unsaved_changes_is_rejected() {
    let f = fixture(0);
    let mut order =
        AggregateRoot::<OrderAggregate>::create_from_command(&create_command(), f.repository.clock())
            .unwrap();
    f.repository.save(&mut order).await.unwrap();

    order.execute(&OrderCommand::ConfirmOrder).unwrap();
    let err = f.repository.snapshot(&order).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::PendingChanges { pending: 1, .. })
    ));

    let shard = f.repository.snapshot_repository().shard_for(order.id());
    assert_eq!(f.broker.record_count(&shard).await, 0);

    let stored = f.repository.get_by_id(order.id()).await.unwrap();
    assert_eq!(stored.state().status, OrderStatus::Created);
    assert_eq!(stored.version().value(), 0);
}
