// ============================================================================
// redpanda_es - event-sourced aggregate store on a partitioned log
// ============================================================================
//
// Layers, bottom-up:
// - messaging:       LogBroker / LogCursor (Redpanda via rdkafka, in-memory)
// - event_sourcing:  identities, envelopes, sharding, event store, snapshot
//                    repository, aggregate repository, publisher
// - domain:          concrete aggregates built on the generic core
// - config, metrics, utils: ambient plumbing
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod messaging;
pub mod metrics;
pub mod utils;

pub use config::StoreConfig;
