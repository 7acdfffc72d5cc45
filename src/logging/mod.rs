//! Logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "imagemill=info,sqlx=warn,tower_http=info";

/// Initialize the global tracing subscriber.
///
/// The filter is taken from `IMAGEMILL_LOG` (falling back to `RUST_LOG`,
/// then to [`DEFAULT_LOG_FILTER`]).
pub fn init() {
    let filter = std::env::var("IMAGEMILL_LOG")
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
