use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Order;

// ============================================================================
// Order Cache
// ============================================================================
//
// In-memory order_uid -> order map shared by the ingestor, the warmer and the
// query path. Entries are stored behind `Arc`, so a reader either gets the
// previous complete order or the new complete order, never a mix.
//
// There is no eviction and no size bound: the cache grows with the number of
// distinct orders for the lifetime of the process.
//
// ============================================================================

#[derive(Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<String, Arc<Order>>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let hit = self.orders.read().get(order_uid).cloned();
        tracing::trace!(order_uid = %order_uid, hit = hit.is_some(), "Cache lookup");
        hit
    }

    /// Insert or replace the order stored under its `order_uid`. Last write wins.
    pub fn set(&self, order: impl Into<Arc<Order>>) {
        let order = order.into();
        let key = order.order_uid.clone();
        self.orders.write().insert(key, order);
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{sample_item, sample_order};

    #[test]
    fn test_get_after_set_returns_equal_order() {
        let cache = OrderCache::new();
        let order = sample_order("uid-1");

        cache.set(order.clone());

        assert_eq!(cache.get("uid-1").as_deref(), Some(&order));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = OrderCache::new();
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites_same_key() {
        let cache = OrderCache::new();
        cache.set(sample_order("uid-1"));

        let mut updated = sample_order("uid-1");
        updated.items = vec![sample_item(1, "Replacement")];
        cache.set(updated.clone());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("uid-1").unwrap().items, updated.items);
    }

    #[test]
    fn test_reader_keeps_its_snapshot_after_overwrite() {
        let cache = OrderCache::new();
        cache.set(sample_order("uid-1"));
        let before = cache.get("uid-1").unwrap();

        let mut updated = sample_order("uid-1");
        updated.track_number = "CHANGED".to_string();
        cache.set(updated);

        assert_eq!(before.track_number, "WBILMTESTTRACK");
        assert_eq!(cache.get("uid-1").unwrap().track_number, "CHANGED");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_and_get_observe_whole_orders() {
        let cache = Arc::new(OrderCache::new());
        let mut handles = Vec::new();

        for writer in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for round in 0..200 {
                    let mut order = sample_order(&format!("uid-{}", round % 16));
                    // Every field derived from the same tag, so a torn read would show a mismatch.
                    let tag = format!("w{writer}-r{round}");
                    order.track_number = tag.clone();
                    order.payment.transaction = tag.clone();
                    order.delivery.name = tag;
                    cache.set(order);
                    tokio::task::yield_now().await;
                }
            }));
        }

        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for round in 0..400 {
                    if let Some(order) = cache.get(&format!("uid-{}", round % 16)) {
                        assert_eq!(order.track_number, order.payment.transaction);
                        assert_eq!(order.track_number, order.delivery.name);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 16);
        let key = "uid-3";
        let order = sample_order(key);
        cache.set(order.clone());
        assert_eq!(cache.get(key).as_deref(), Some(&order));
    }
}
