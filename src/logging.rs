use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `default_level`
/// when set, e.g. `RUST_LOG=order_ingest=debug,rdkafka=warn`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .try_init();
}
