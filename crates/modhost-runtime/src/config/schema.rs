//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModhostConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Lifecycle loop bounds and control-loop sizing.
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Text resources read once at startup.
    #[serde(default)]
    pub files: FileCacheConfig,
}

// =============================================================================
// Runtime
// =============================================================================

/// Bounds of the runtime's convergence loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Passes of `unload_all` before giving up on remaining plugins.
    #[serde(default = "default_unload_passes")]
    pub unload_passes: u32,

    /// Passes of global hook prioritization before keeping the current order.
    #[serde(default = "default_priority_passes")]
    pub priority_passes: u32,

    /// Capacity of the control-loop request queue.
    #[serde(default = "default_control_queue")]
    pub control_queue: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            unload_passes: default_unload_passes(),
            priority_passes: default_priority_passes(),
            control_queue: default_control_queue(),
        }
    }
}

fn default_unload_passes() -> u32 {
    4
}

fn default_priority_passes() -> u32 {
    20
}

fn default_control_queue() -> usize {
    64
}

/// Text resources served by the file cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCacheConfig {
    /// Paths read at startup and served from memory afterwards.
    #[serde(default)]
    pub preload: Vec<PathBuf>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase name used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `modhost_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
