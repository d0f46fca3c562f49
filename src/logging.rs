use tracing_subscriber::{fmt, EnvFilter};

/// Human-readable log lines on stdout. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("country_pipelines=info"));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .try_init();
}
