use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub struct LoggerConfig {
    whoami: String,
}

impl LoggerConfig {
    pub fn new(whoami: String) -> Self {
        Self { whoami }
    }
}

/// Initializes the logging subsystem with the provided config.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();
    let stdout_sub = tracing_subscriber::fmt::layer().compact().with_filter(filt);

    tracing_subscriber::registry().with(stdout_sub).init();

    info!(whoami = %config.whoami, "logging started");
}

/// Shuts down the logging subsystem, flushing files as needed and tearing down
/// resources.
pub fn finalize() {
    info!("shutting down logging");
}
