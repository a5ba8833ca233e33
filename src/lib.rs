//! DIMSE service configuration and logging
//!
//! Re-exports the [`dimse`] crate and adds the application-level pieces
//! around it: a TOML configuration file and tracing setup.

pub mod config;
pub mod logging;

pub use dimse;

use crate::config::{Config, ConfigError};

/// Load the configuration file at `path` and initialize logging from it
pub fn bootstrap(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
    let config = Config::from_file(path)?;
    logging::init(&config.logging)?;
    tracing::info!(
        local_aet = %config.dimse.local_aet,
        peer_aet = %config.dimse.peer_aet,
        "🔧 Configuration loaded"
    );
    Ok(config)
}
