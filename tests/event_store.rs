use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use redpanda_es::domain::order::{OrderCreated, OrderEvent, OrderItem, OrderConfirmed};
use redpanda_es::event_sourcing::{
    AggregateIdentity, DecodeError, EventEnvelope, EventStore, StoreError, Version,
};
use redpanda_es::messaging::{BrokerError, InMemoryBroker, LogBroker};

fn store(broker: &InMemoryBroker) -> EventStore<OrderEvent> {
    EventStore::new(Arc::new(broker.clone())).with_poll_timeout(Duration::from_millis(10))
}

fn order_id() -> AggregateIdentity {
    AggregateIdentity::generate("sales", "order", "ORD").unwrap()
}

fn created(id: &AggregateIdentity) -> EventEnvelope<OrderEvent> {
    EventEnvelope::new(
        id.clone(),
        OrderEvent::Created(OrderCreated {
            customer_id: Uuid::new_v4(),
            items: vec![OrderItem::new(Uuid::new_v4(), 1)],
        }),
        Utc::now(),
    )
}

fn confirmed(id: &AggregateIdentity) -> EventEnvelope<OrderEvent> {
    EventEnvelope::new(id.clone(), OrderEvent::Confirmed(OrderConfirmed {}), Utc::now())
}

#[tokio::test]
async fn test_load_all_without_history_is_explicitly_empty() {
    let broker = InMemoryBroker::new();
    let stream = store(&broker).load_all(&order_id()).await.unwrap();

    assert!(stream.is_empty());
    assert_eq!(stream.version(), Version::NONE);
}

#[tokio::test]
async fn test_sequence_numbers_are_offsets() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    let v = store
        .append(&id, Version::NONE, &[created(&id), confirmed(&id)])
        .await
        .unwrap();
    assert_eq!(v, Version::from_offset(1));

    let stream = store.load_all(&id).await.unwrap();
    let sequence: Vec<i64> = stream.events().iter().map(|e| e.sequence_number.value()).collect();
    assert_eq!(sequence, vec![0, 1]);
    assert_eq!(stream.events()[0].event_type, "OrderCreated");
    assert!(stream.events().iter().all(|e| e.is_committed()));
}

#[tokio::test]
async fn test_stale_writer_is_rejected_and_shard_is_untouched() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    store
        .append(&id, Version::NONE, &[created(&id), confirmed(&id), confirmed(&id)])
        .await
        .unwrap();
    let before = broker.records(&store.shard_for(&id)).await;

    for stale in [Version::NONE, Version::from_offset(0), Version::from_offset(1)] {
        let err = store.append(&id, stale, &[confirmed(&id)]).await.unwrap_err();
        match err {
            StoreError::ConcurrencyConflict {
                shard,
                current,
                expected,
            } => {
                assert_eq!(shard, store.shard_for(&id));
                assert_eq!(current, 2);
                assert_eq!(expected, stale);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    assert_eq!(broker.records(&store.shard_for(&id)).await, before);
}

#[tokio::test]
async fn test_append_at_current_version_succeeds() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    let v0 = store.append(&id, Version::NONE, &[created(&id)]).await.unwrap();
    let v1 = store.append(&id, v0, &[confirmed(&id)]).await.unwrap();
    assert_eq!(v1.value(), 1);
    assert_eq!(store.current_version(&id).await, v1);
}

#[tokio::test]
async fn test_aggregates_do_not_share_streams() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let a = order_id();
    let b = order_id();

    store.append(&a, Version::NONE, &[created(&a)]).await.unwrap();
    store.append(&b, Version::NONE, &[created(&b), confirmed(&b)]).await.unwrap();

    assert_eq!(store.load_all(&a).await.unwrap().len(), 1);
    assert_eq!(store.load_all(&b).await.unwrap().len(), 2);
    assert_eq!(broker.shards().await.len(), 2);
}

#[tokio::test]
async fn test_corrupt_record_fails_the_read() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    store.append(&id, Version::NONE, &[created(&id)]).await.unwrap();
    broker
        .append(&store.shard_for(&id), id.as_str(), b"\xff\xfe garbage".to_vec(), Utc::now())
        .await
        .unwrap();

    let err = store.load_all(&id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Decode {
            offset: 1,
            source: DecodeError::Corrupt(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_unknown_event_type_is_reported_as_such() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    // A well-formed envelope carrying an event this build does not know
    let mut record = serde_json::to_value(created(&id)).unwrap();
    record["event_type"] = serde_json::json!("OrderRefunded");
    record["event_data"] = serde_json::json!({"type": "Refunded", "data": {"amount": 10}});

    broker
        .append(
            &store.shard_for(&id),
            id.as_str(),
            serde_json::to_vec(&record).unwrap(),
            Utc::now(),
        )
        .await
        .unwrap();

    match store.load_all(&id).await.unwrap_err() {
        StoreError::Decode {
            source: DecodeError::UnknownType(name),
            offset,
            ..
        } => {
            assert_eq!(name, "Refunded");
            assert_eq!(offset, 0);
        }
        other => panic!("expected unknown type, got {:?}", other),
    }
}

#[tokio::test]
async fn test_degraded_metadata_falls_back_to_unknown() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    store.append(&id, Version::NONE, &[created(&id)]).await.unwrap();
    broker.set_fail_metadata(true);

    assert_eq!(store.current_version(&id).await, Version::NONE);
    assert!(!store.exists(&id).await);
}

#[tokio::test]
async fn test_stale_append_during_metadata_outage_is_rejected() {
    let broker = InMemoryBroker::new();
    let store = store(&broker);
    let id = order_id();

    store.append(&id, Version::NONE, &[created(&id)]).await.unwrap();
    store.append(&id, Version::from_offset(0), &[confirmed(&id)]).await.unwrap();
    store.append(&id, Version::from_offset(1), &[confirmed(&id)]).await.unwrap();
    broker.set_fail_metadata(true);

    let err = store
        .append(&id, Version::from_offset(0), &[confirmed(&id)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Broker {
            source: BrokerError::Metadata(_),
            ..
        }
    ));
    assert!(!err.is_concurrency_conflict());
    assert_eq!(broker.record_count(&store.shard_for(&id)).await, 3);
}
