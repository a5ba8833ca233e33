mod logging_config;
pub mod config;


pub use config::{Config, ConfigError};
pub use logging_config::LoggingConfig;
