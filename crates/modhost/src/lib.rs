//! # modhost
//!
//! A hot-loadable plugin runtime for long-lived network daemons.
//!
//! Plugins register named services (commands, modes, metadata, data
//! providers, I/O hooks), subscribe to hook points and can be unloaded at
//! any time without leaving registrations, subscriptions, per-object data
//! or dangling references behind.
//!
//! ## Crates
//!
//! - [`core`]: service registry, dynamic references, hook tables,
//!   session-object contracts, file cache
//! - [`runtime`]: plugin lifecycle, control loop, configuration, logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use modhost::prelude::*;
//!
//! struct Motd;
//!
//! impl Plugin for Motd {
//!     fn version(&self) -> Version {
//!         Version::new("Serves the message of the day", VersionFlags::VENDOR)
//!     }
//!
//!     fn init(&self, ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
//!         let motd = ctx.files().load("motd.txt")?;
//!         ctx.add_service(ServiceProvider::data(ctx.name(), "text/motd", motd))?;
//!         ctx.attach(EventKind::UserConnect);
//!         Ok(())
//!     }
//! }
//!
//! let mut runtime = PluginRuntime::builder().preload("motd.txt").build()?;
//! runtime.load_plugin("m_motd", Motd)?;
//! ```

pub use modhost_core as core;
pub use modhost_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use modhost::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use modhost_runtime::{
        ControlHandle, ControlLoop, ModhostConfig, PluginRuntime, RuntimeError, RuntimeResult,
    };

    // Plugin contract
    pub use modhost_runtime::{BoxError, ModuleRef, Plugin, PluginContext};

    // Events and hook ordering
    pub use modhost_core::{Event, EventKind, LoadModule, ModResult, Priority, UnloadModule};

    // Services and references
    pub use modhost_core::{
        CommandHandler, DynamicReference, ModeHandler, ModeType, ServiceKind, ServiceProvider,
    };

    // Session objects
    pub use modhost_core::{ExtensionItem, SessionObject, TargetType};

    // Version metadata
    pub use modhost_core::{Version, VersionFlags};
}
