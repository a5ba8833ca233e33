//! Tracing subscriber setup

use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ConfigError, LoggingConfig};

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once keeps the first subscriber.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| ConfigError::InvalidLogLevel(config.level.clone()))?,
    };

    let stdout_layer = fmt::layer().with_file(true).with_line_number(true);

    let file_layer = if config.log_to_file {
        let file = File::create(&config.log_file_path)?;
        Some(
            fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!("Logging already initialized, keeping existing subscriber");
    }
    Ok(())
}
