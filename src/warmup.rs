use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::store::OrderStore;

/// Load every stored order into the cache before traffic starts.
///
/// A failing store leaves the cache cold and the service keeps starting;
/// lookups fall back to the store anyway. Returns how many orders were loaded.
pub async fn warm_cache(store: &dyn OrderStore, cache: &OrderCache, metrics: &Metrics) -> usize {
    tracing::info!("Warming order cache from the store...");

    let orders = match store.get_all_orders().await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::error!(error = %e, "Cache warmup failed, starting with a cold cache");
            return 0;
        }
    };

    let loaded = orders.len();
    for order in orders {
        cache.set(order);
    }
    metrics.set_cache_entries(cache.len());

    tracing::info!(loaded = loaded, "Cache warmed from store");
    loaded
}
