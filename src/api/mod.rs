use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

use crate::metrics::Metrics;
use crate::service::OrderReader;

mod handlers;

// ============================================================================
// Read API
// ============================================================================
//
//   GET /orders        all orders (cache first)
//   GET /orders/{id}   one order, 404 when unknown
//   GET /health        liveness
//   GET /metrics       Prometheus text format
//
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderReader>,
    pub metrics: Arc<Metrics>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::get().to(handlers::list_orders))
        .route("/orders/{id}", web::get().to(handlers::get_order))
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics));
}

/// Bind and start the server. Signals are handled by the caller, which stops
/// the returned server through its handle.
pub fn start_http_server(state: AppState, addr: &str, shutdown_grace: Duration) -> std::io::Result<Server> {
    tracing::info!("Starting HTTP server on http://{}", addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .bind(addr)?
    .shutdown_timeout(shutdown_grace.as_secs())
    .disable_signals()
    .run();

    Ok(server)
}
