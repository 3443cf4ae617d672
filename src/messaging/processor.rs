use std::sync::Arc;
use std::time::Instant;

use crate::cache::OrderCache;
use crate::error::DecodeError;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;

// ============================================================================
// Order Record Processor
// ============================================================================
//
// Pipeline for a single broker record:
//
//   payload -> decode -> store.save_order -> cache.set -> acknowledge
//
// Only a persisted record is acknowledged. Empty and malformed payloads and
// failed saves are logged, counted and dropped; none of them stops the
// partition. A failed save is attempted once and never retried, so a later
// acknowledged record on the same partition moves the committed offset past
// it.
//
// ============================================================================

/// Broker-independent view of a consumed record.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Persisted,
    Empty,
    Malformed,
    PersistFailed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Persisted => "persisted",
            Outcome::Empty => "empty",
            Outcome::Malformed => "malformed",
            Outcome::PersistFailed => "persist_failed",
        }
    }

    pub fn should_acknowledge(&self) -> bool {
        matches!(self, Outcome::Persisted)
    }
}

pub struct OrderProcessor {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
}

impl OrderProcessor {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self { store, cache, metrics }
    }

    pub async fn process(&self, record: &InboundRecord) -> Outcome {
        let started = Instant::now();
        let outcome = self.handle(record).await;
        self.metrics
            .record_ingest(outcome.label(), started.elapsed().as_secs_f64());
        outcome
    }

    async fn handle(&self, record: &InboundRecord) -> Outcome {
        let payload = record.payload.as_deref().unwrap_or_default();

        let order = match Order::from_payload(payload) {
            Ok(order) => order,
            Err(DecodeError::Empty) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "Skipping record with empty payload"
                );
                return Outcome::Empty;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "Skipping undecodable record"
                );
                return Outcome::Malformed;
            }
        };

        if let Err(e) = self.store.save_order(&order).await {
            tracing::error!(
                error = %e,
                order_uid = %order.order_uid,
                partition = record.partition,
                offset = record.offset,
                "Failed to persist order, dropping record"
            );
            return Outcome::PersistFailed;
        }

        let order_uid = order.order_uid.clone();
        self.cache.set(order);
        self.metrics.set_cache_entries(self.cache.len());

        tracing::info!(
            order_uid = %order_uid,
            partition = record.partition,
            offset = record.offset,
            "Order persisted and cached"
        );

        Outcome::Persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{sample_item, sample_order};
    use crate::store::memory::InMemoryStore;

    fn record(offset: i64, payload: Option<Vec<u8>>) -> InboundRecord {
        InboundRecord {
            topic: "orders".to_string(),
            partition: 0,
            offset,
            payload,
        }
    }

    fn encoded(order: &Order) -> Option<Vec<u8>> {
        Some(serde_json::to_vec(order).unwrap())
    }

    fn processor(store: Arc<InMemoryStore>, cache: Arc<OrderCache>) -> OrderProcessor {
        OrderProcessor::new(store, cache, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_valid_record_is_persisted_cached_and_acknowledged() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        let processor = processor(store.clone(), cache.clone());
        let order = sample_order("uid-1");

        let outcome = processor.process(&record(0, encoded(&order))).await;

        assert_eq!(outcome, Outcome::Persisted);
        assert!(outcome.should_acknowledge());
        assert_eq!(store.stored("uid-1"), Some(order.clone()));
        assert_eq!(cache.get("uid-1").as_deref(), Some(&order));
    }

    #[tokio::test]
    async fn test_empty_payload_is_skipped() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        let processor = processor(store.clone(), cache.clone());

        assert_eq!(processor.process(&record(0, None)).await, Outcome::Empty);
        assert_eq!(processor.process(&record(1, Some(Vec::new()))).await, Outcome::Empty);
        assert_eq!(processor.process(&record(2, Some(b"\n".to_vec()))).await, Outcome::Empty);
        assert_eq!(store.saves(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_block_the_next_one() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        let processor = processor(store.clone(), cache.clone());
        let order = sample_order("uid-2");

        let bad = processor.process(&record(0, Some(b"{not json".to_vec()))).await;
        let good = processor.process(&record(1, encoded(&order))).await;

        assert_eq!(bad, Outcome::Malformed);
        assert!(!bad.should_acknowledge());
        assert_eq!(good, Outcome::Persisted);
        assert_eq!(store.stored("uid-2"), Some(order.clone()));
        assert_eq!(cache.get("uid-2").as_deref(), Some(&order));
    }

    #[tokio::test]
    async fn test_failed_save_is_not_cached_or_acknowledged() {
        let store = Arc::new(InMemoryStore::default());
        store.fail_saves_for("uid-3");
        let cache = Arc::new(OrderCache::new());
        let processor = processor(store.clone(), cache.clone());

        let outcome = processor.process(&record(0, encoded(&sample_order("uid-3")))).await;

        assert_eq!(outcome, Outcome::PersistFailed);
        assert!(!outcome.should_acknowledge());
        assert!(cache.get("uid-3").is_none());
        // Attempted once, never retried.
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_record_replaces_items() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(OrderCache::new());
        let processor = processor(store.clone(), cache.clone());

        let first = sample_order("uid-4");
        let mut second = first.clone();
        second.items = vec![sample_item(77, "Only item")];

        processor.process(&record(0, encoded(&first))).await;
        processor.process(&record(1, encoded(&second))).await;
        processor.process(&record(1, encoded(&second))).await;

        assert_eq!(store.stored("uid-4").unwrap().items, second.items);
        assert_eq!(cache.get("uid-4").unwrap().items, second.items);
        assert_eq!(cache.len(), 1);
    }
}
