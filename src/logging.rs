//! Tracing subscriber setup.

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let _ = subscriber(config).try_init();
}

/// Builds the subscriber [`init`] installs, without installing it.
pub fn subscriber(config: &LoggingConfig) -> Box<dyn Subscriber + Send + Sync> {
    let filter = filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), &config.level);

    // Logs go to stderr so progress output on stdout stays readable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    }
}

fn filter(env: Option<String>, level: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
