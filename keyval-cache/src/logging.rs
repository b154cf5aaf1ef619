use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. `format` is `json`,
/// `pretty`, or anything else for the compact text format. Fails if a
/// global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
