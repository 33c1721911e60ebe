//! modhost Runtime - plugin lifecycle orchestration.
//!
//! This crate provides:
//! - The root runtime instance (`PluginRuntime`) owning the plugin table,
//!   service registry and hook table
//! - The `Plugin` trait and the per-call `PluginContext`
//! - Safe unloading with deferred destruction (`CullList`)
//! - A control loop marshalling requests from other threads (`ControlLoop`)
//! - Configuration and logging setup
//!
//! ```ignore
//! use modhost_runtime::{ControlLoop, PluginRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = modhost_runtime::config::load_config()?;
//!     let runtime = PluginRuntime::from_config(&config)?;
//!
//!     let (handle, task) = ControlLoop::spawn(runtime);
//!     handle.load("m_example", ExamplePlugin::default()).await?;
//!
//!     // ...
//!
//!     handle.shutdown().await?;
//!     task.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Reentrancy
//!
//! Handlers receive `&mut PluginContext` and may attach, detach, reorder or
//! unload plugins while an event is being dispatched. Dispatch iterates a
//! snapshot of the subscriber list and skips subscribers detached since the
//! snapshot was taken. Unloaded plugins stay alive on the cull list until it
//! is flushed between requests.

pub mod config;
pub mod context;
pub mod control;
pub mod cull;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, ModhostConfig, RuntimeSettings};
pub use context::PluginContext;
pub use control::{ControlHandle, ControlLoop};
pub use cull::CullList;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use plugin::{BoxError, Module, ModuleRef, Plugin, PluginState};
pub use runtime::{CapabilityAdvertiser, PluginRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the logging macros plugins use:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
