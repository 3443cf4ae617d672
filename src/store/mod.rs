// ============================================================================
// Order Store
// ============================================================================
//
// Durable home of the order aggregate. The ingestor writes through it, the
// warmer enumerates it once at boot and the query path falls back to it on a
// cache miss.
//
// ============================================================================

mod postgres;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::Order;

pub use postgres::{PgOrderStore, PostgresConfig};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Upsert the whole aggregate atomically. Items are replaced, not merged.
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError>;

    /// Load one aggregate. `Ok(None)` when no header row exists.
    async fn get_order(&self, order_uid: &str) -> Result<Option<Order>, PersistenceError>;

    /// Load every stored aggregate. One round trip per order; boot-time only.
    async fn get_all_orders(&self) -> Result<Vec<Order>, PersistenceError>;
}
