use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::read_path::OrderLookup;

// ============================================================================
// HTTP API
// ============================================================================
//
//   GET /             order viewer page
//   GET /orders/{id}  order aggregate as JSON, 404 when unknown
//   GET /health       liveness + cache size
//   GET /metrics      Prometheus text format
//
// Store errors on the order route are logged and answered with 404, the same
// as an unknown id.
//
// ============================================================================

const VIEWER_PAGE: &str = include_str!("viewer.html");

pub struct AppState {
    pub lookup: OrderLookup,
    pub metrics: Arc<Metrics>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(viewer_handler))
        .route("/orders/{id}", web::get().to(order_handler))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Bind the API server. Signal handling is left to the caller, which stops
/// the server through its handle.
pub fn start_http_server(
    state: web::Data<AppState>,
    addr: SocketAddr,
    shutdown_timeout: Duration,
) -> std::io::Result<Server> {
    tracing::info!("Starting HTTP server on http://{}", addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes)
    })
    .disable_signals()
    .shutdown_timeout(shutdown_timeout.as_secs())
    .bind(addr)?
    .run();

    Ok(server)
}

async fn viewer_handler() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(VIEWER_PAGE)
}

async fn order_handler(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let order_uid = path.into_inner();
    if order_uid.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "missing or invalid order id"
        }));
    }

    match state.lookup.lookup(&order_uid).await {
        Ok(Some(order)) => HttpResponse::Ok().json(order.as_ref()),
        Ok(None) => not_found(),
        Err(e) => {
            tracing::error!(error = %e, order_uid = %order_uid, "Failed to read order from store");
            not_found()
        }
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "order not found" }))
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-cache-service",
        "cached_orders": state.lookup.cached_orders(),
    }))
}
