//! Unified error types for the modhost core components.
//!
//! Registry errors surface synchronously to whoever attempted the
//! registration (usually a plugin's `init`), plugin errors report refused
//! lifecycle transitions, and file errors come from [`FileCache`].
//!
//! [`FileCache`]: crate::file_cache::FileCache

use std::path::PathBuf;

use thiserror::Error;

use crate::service::ServiceKind;

// =============================================================================
// Service Errors
// =============================================================================

/// Errors raised by the [`ServiceRegistry`](crate::service::ServiceRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A provider with the same exact key is already registered.
    #[error("{kind} '{name}' already exists")]
    DuplicateService {
        /// Kind of the rejected provider.
        kind: ServiceKind,
        /// Name of the rejected provider.
        name: String,
    },

    /// The operation is not defined for this kind of provider.
    #[error("operation not supported for {0} services")]
    UnknownServiceKind(ServiceKind),

    /// The `mode/` prefix is reserved for mode providers.
    #[error("the \"mode/\" service name prefix is reserved: {0}")]
    ReservedServiceName(String),

    /// A mode letter outside `A-Z` / `a-z`.
    #[error("invalid mode letter '{0}'")]
    ModeLetterInvalid(char),

    /// The provider to remove is not registered.
    #[error("{kind} '{name}' does not exist")]
    ServiceNotFound {
        /// Kind of the missing provider.
        kind: ServiceKind,
        /// Name of the missing provider.
        name: String,
    },
}

// =============================================================================
// Plugin Errors
// =============================================================================

/// Errors raised by plugin lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// No plugin with this name is loaded.
    #[error("plugin {0} is not loaded")]
    PluginNotLoaded(String),

    /// The plugin is already being unloaded.
    #[error("plugin {0} is already being unloaded")]
    AlreadyDying(String),

    /// The plugin is flagged as static.
    #[error("plugin {0} is not unloadable (marked static)")]
    NonUnloadable(String),

    /// A plugin with this name is already loaded.
    #[error("plugin {0} is already loaded")]
    AlreadyLoaded(String),

    /// The plugin's initialisation failed and was rolled back.
    #[error("plugin {name} failed to initialise: {reason}")]
    InitFailed {
        /// Plugin name.
        name: String,
        /// Error reported by the plugin.
        reason: String,
    },
}

// =============================================================================
// File Errors
// =============================================================================

/// Errors raised while reading a text resource.
#[derive(Debug, Error)]
pub enum FileError {
    /// The resource does not exist.
    #[error("{} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The resource exists but could not be read.
    #[error("{} is not readable: {reason}", path.display())]
    FileNotReadable {
        /// Path of the resource.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },
}

impl FileError {
    /// Classifies an I/O error raised while opening or reading `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path),
            _ => Self::FileNotReadable {
                path,
                reason: err.to_string(),
            },
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registry operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type for plugin lifecycle operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type for file reads.
pub type FileResult<T> = Result<T, FileError>;
