use actix_web::web;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_cache_service::config::{AppConfig, LogFormat};
use order_cache_service::http::{start_http_server, AppState};
use order_cache_service::messaging::{OrderIngestor, OrderProcessor};
use order_cache_service::metrics::Metrics;
use order_cache_service::warmup::warm_cache;
use order_cache_service::{OrderCache, OrderLookup, OrderStore, PgOrderStore};

fn init_tracing(format: LogFormat) {
    // Default to INFO, overridable with RUST_LOG
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,order_cache_service=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Starting order cache service");

    // === 1. Store (fatal if unreachable) ===
    let pg = PgOrderStore::connect(&config.postgres).await?;
    pg.ensure_schema().await?;
    let store: Arc<dyn OrderStore> = Arc::new(pg);

    // === 2. Shared components ===
    let metrics = Arc::new(Metrics::new()?);
    let cache = Arc::new(OrderCache::new());

    // === 3. Warm the cache before any traffic ===
    warm_cache(store.as_ref(), &cache, &metrics).await;

    // === 4. Kafka ingestor (fatal if the consumer cannot be created) ===
    let processor = Arc::new(OrderProcessor::new(store.clone(), cache.clone(), metrics.clone()));
    let ingestor = OrderIngestor::new(&config.kafka, processor, metrics.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut ingestor_task = tokio::spawn(ingestor.run(shutdown_rx));

    // === 5. HTTP API ===
    let state = web::Data::new(AppState {
        lookup: OrderLookup::new(cache.clone(), store.clone(), metrics.clone()),
        metrics: metrics.clone(),
    });
    let server = start_http_server(state, config.http_addr, config.shutdown_grace)?;
    let server_handle = server.handle();
    tokio::pin!(server);

    // === 6. Run until a signal, the server or the ingestor stops ===
    let mut ingestor_done = false;
    let mut server_done = false;
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
        result = &mut server => {
            server_done = true;
            match result {
                Ok(()) => tracing::warn!("HTTP server exited"),
                Err(e) => tracing::error!(error = %e, "HTTP server failed"),
            }
        }
        result = &mut ingestor_task => {
            ingestor_done = true;
            match result {
                Ok(Ok(())) => tracing::warn!("Kafka ingestor exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "Kafka ingestor failed"),
                Err(e) => tracing::error!(error = %e, "Kafka ingestor task panicked"),
            }
        }
    }

    // === 7. Graceful shutdown within the grace window ===
    tracing::info!(grace_secs = config.shutdown_grace.as_secs(), "Shutting down gracefully...");
    let _ = shutdown_tx.send(true);
    if !server_done {
        // The server future has to keep running to process its own stop command.
        let (_, result) = tokio::join!(server_handle.stop(true), &mut server);
        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server failed while stopping");
        }
    }

    if !ingestor_done {
        match tokio::time::timeout(config.shutdown_grace, ingestor_task).await {
            Ok(Ok(Ok(()))) => tracing::info!("Kafka ingestor stopped"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Kafka ingestor stopped with error"),
            Ok(Err(e)) => tracing::error!(error = %e, "Kafka ingestor task panicked"),
            Err(_) => tracing::warn!("Kafka ingestor did not stop within the grace period"),
        }
    }

    tracing::info!("Service exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
