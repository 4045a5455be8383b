use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use order_ingest::api::{self, AppState};
use order_ingest::cache::{InMemoryOrderCache, OrderCache};
use order_ingest::config::Config;
use order_ingest::messaging::{OrderConsumer, OrderIngestor, RedpandaClient};
use order_ingest::metrics::Metrics;
use order_ingest::service::OrderService;
use order_ingest::store::PgOrderRepository;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    order_ingest::logging::init(&config.log_level);

    tracing::info!(?config, "Starting order ingest service");

    // === 1. Postgres pool ===
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to Postgres");

    let metrics = Arc::new(Metrics::new()?);

    // === 2. Store and cache; a failed restore aborts startup ===
    let repo = Arc::new(PgOrderRepository::new(pool.clone()));
    let cache = Arc::new(InMemoryOrderCache::new(repo.clone()));
    let restored = cache.restore().await?;
    metrics.cache_restored_orders.set(restored as i64);

    let service = Arc::new(OrderService::new(repo, cache));

    // === 3. Consumer ===
    let producer = Arc::new(RedpandaClient::new(&config.kafka_brokers)?);
    let ingestor = Arc::new(OrderIngestor::new(service.clone()));
    let consumer = OrderConsumer::new(
        config.consumer_settings(),
        ingestor,
        metrics.clone(),
        Some(producer.clone()),
    )?;
    let subscription = consumer.subscribe()?;
    tracing::info!(topic = subscription.topic(), "Consuming orders");

    // === 4. Read API ===
    let state = AppState {
        orders: service,
        metrics: metrics.clone(),
    };
    let server = api::start_http_server(state, &config.http_addr, config.shutdown_grace)?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    // === 5. Teardown, reverse of startup ===
    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server stopped with an error"),
        Err(e) => tracing::warn!(error = %e, "HTTP server task ended abnormally"),
    }

    subscription.unsubscribe().await?;
    producer.flush(Duration::from_secs(5));
    pool.close().await;

    tracing::info!("Order ingest service stopped");
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
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
