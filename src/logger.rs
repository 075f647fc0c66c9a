use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Install the global subscriber, filtered by "RUST_LOG" when it is set
pub fn init_logging() {
    let level = if cfg!(debug_assertions) { "trace" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Only visible once the subscriber is installed
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}
