//! Runtime error types.

use modhost_core::{FileError, PluginError, ServiceError};
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A lifecycle transition was refused.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A registry operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A preloaded resource could not be read.
    #[error(transparent)]
    File(#[from] FileError),

    /// Configuration failed to load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The control loop has stopped and no longer accepts requests.
    #[error("Control loop is closed")]
    ControlLoopClosed,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
