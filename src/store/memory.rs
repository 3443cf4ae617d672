use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::OrderStore;
use crate::error::PersistenceError;
use crate::models::Order;

/// Map-backed store for tests. Counts calls and can be told to fail.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    orders: Mutex<BTreeMap<String, Order>>,
    saves: AtomicUsize,
    reads: AtomicUsize,
    fail_saves_for: Mutex<Vec<String>>,
    fail_reads: Mutex<bool>,
}

impl InMemoryStore {
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::default();
        store
            .orders
            .lock()
            .extend(orders.into_iter().map(|o| (o.order_uid.clone(), o)));
        store
    }

    pub fn fail_saves_for(&self, order_uid: &str) {
        self.fail_saves_for.lock().push(order_uid.to_string());
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock() = true;
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().get(order_uid).cloned()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves_for.lock().contains(&order.order_uid) {
            return Err(PersistenceError::Database(sqlx::Error::PoolClosed));
        }
        self.orders.lock().insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Option<Order>, PersistenceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if *self.fail_reads.lock() {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.orders.lock().get(order_uid).cloned())
    }

    async fn get_all_orders(&self) -> Result<Vec<Order>, PersistenceError> {
        if *self.fail_reads.lock() {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.orders.lock().values().cloned().collect())
    }
}
