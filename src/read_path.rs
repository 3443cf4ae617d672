use std::sync::Arc;

use crate::cache::OrderCache;
use crate::error::PersistenceError;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;

// ============================================================================
// Order Lookup - cache first, store on miss
// ============================================================================
//
// A hit never touches the store. A miss reads the store and, when the order
// exists, fills the cache so the next lookup for the same id is a hit.
//
// ============================================================================

pub struct OrderLookup {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl OrderLookup {
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { cache, store, metrics }
    }

    /// `Ok(None)` when the order is in neither the cache nor the store.
    pub async fn lookup(&self, order_uid: &str) -> Result<Option<Arc<Order>>, PersistenceError> {
        if let Some(order) = self.cache.get(order_uid) {
            self.metrics.record_lookup("hit");
            tracing::debug!(order_uid = %order_uid, "Order served from cache");
            return Ok(Some(order));
        }

        let stored = match self.store.get_order(order_uid).await {
            Ok(stored) => stored,
            Err(e) => {
                self.metrics.record_lookup("error");
                return Err(e);
            }
        };

        let Some(order) = stored else {
            self.metrics.record_lookup("not_found");
            tracing::debug!(order_uid = %order_uid, "Order not found");
            return Ok(None);
        };

        let order = Arc::new(order);
        self.cache.set(order.clone());
        self.metrics.record_lookup("miss");
        self.metrics.set_cache_entries(self.cache.len());
        tracing::debug!(order_uid = %order_uid, "Order loaded from store and cached");

        Ok(Some(order))
    }

    pub fn cached_orders(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_order;
    use crate::store::memory::InMemoryStore;

    fn lookup_over(store: Arc<InMemoryStore>, cache: Arc<OrderCache>) -> OrderLookup {
        OrderLookup::new(cache, store, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        cache.set(sample_order("cached"));
        let lookup = lookup_over(store.clone(), cache);

        let order = lookup.lookup("cached").await.unwrap().unwrap();

        assert_eq!(order.order_uid, "cached");
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_miss_fills_cache_for_next_lookup() {
        let store = Arc::new(InMemoryStore::with_orders([sample_order("stored")]));
        let cache = Arc::new(OrderCache::new());
        let lookup = lookup_over(store.clone(), cache.clone());

        let first = lookup.lookup("stored").await.unwrap().unwrap();
        assert_eq!(*first, sample_order("stored"));
        assert_eq!(store.reads(), 1);
        assert!(cache.get("stored").is_some());

        let second = lookup.lookup("stored").await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        let lookup = lookup_over(store, cache.clone());

        assert!(lookup.lookup("nonexistent").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_is_surfaced() {
        let store = Arc::new(InMemoryStore::with_orders([sample_order("x")]));
        store.fail_reads();
        let lookup = lookup_over(store, Arc::new(OrderCache::new()));

        assert!(lookup.lookup("x").await.is_err());
    }
}
