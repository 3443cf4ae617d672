// ============================================================================
// Order Cache Service
// ============================================================================
//
// Orders arrive on a Kafka topic, are written to Postgres and cached in
// memory; GET /orders/{id} serves them cache first with the store as
// fallback.
//
//   kafka record -> messaging (decode) -> store (upsert) -> cache (set)
//   http request -> read_path -> cache | store -> cache
//
// ============================================================================

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod read_path;
pub mod store;
pub mod utils;
pub mod warmup;

pub use cache::OrderCache;
pub use models::{Delivery, Item, Order, Payment};
pub use read_path::OrderLookup;
pub use store::{OrderStore, PgOrderStore};
