//! Configuration module for the modhost runtime.
//!
//! Covers only the runtime's own settings: logging, the pass bounds of the
//! lifecycle loops, control-loop sizing and preloaded text resources. The
//! host daemon's configuration is not parsed here.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    FileCacheConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ModhostConfig,
    RuntimeSettings, SpanEventConfig,
};
pub use validation::validate_config;
