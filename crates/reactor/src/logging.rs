//! Logging initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Initializes the logging subsystem. Production emits JSON lines; anything
/// else gets the pretty format.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        subscriber.with(fmt::layer().json().with_target(true)).init();
    } else {
        subscriber.with(fmt::layer().pretty().with_target(true)).init();
    }
}
