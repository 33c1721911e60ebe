//! # modhost Core
//!
//! Leaf components of the modhost plugin runtime.
//!
//! - **Service registry**: typed index of named capabilities ([`ServiceRegistry`],
//!   [`ServiceProvider`])
//! - **Dynamic references**: late-bound handles kept in sync with the registry
//!   ([`DynamicReference`])
//! - **Hook tables**: ordered per-event subscriber lists with relative
//!   priority moves ([`HookTable`], [`Priority`])
//! - **Session contracts**: per-object extension data owned by plugins
//!   ([`ExtensionItem`], [`Extensible`], [`SessionObject`])
//! - **File cache**: preloaded text resources ([`FileCache`])
//!
//! None of these types lock around whole operations. They are meant to be
//! owned by a single control thread, which is what `modhost-runtime` does.
//!
//! ## Example
//!
//! ```rust
//! use modhost_core::{ServiceKind, ServiceProvider, ServiceRegistry};
//!
//! let mut registry = ServiceRegistry::new();
//! let sql = registry.dynamic_reference("sql");
//!
//! registry
//!     .add_service(ServiceProvider::data("m_mysql", "sql/mysql", 3306_u16))
//!     .unwrap();
//!
//! assert_eq!(sql.data::<u16>().as_deref(), Some(&3306));
//! assert!(registry.find_service(ServiceKind::Data, "mysql").unwrap().is_some());
//! ```

pub mod error;
pub mod event;
pub mod extension;
pub mod file_cache;
pub mod hooks;
pub mod reference;
pub mod service;
pub mod session;
pub mod version;

pub use error::{
    FileError, FileResult, PluginError, PluginResult, ServiceError, ServiceResult,
};
pub use event::{Event, EventKind, LoadModule, ModResult, UnloadModule};
pub use extension::{Extensible, ExtensionItem};
pub use file_cache::{CachedFile, FileCache};
pub use hooks::{HookTable, Priority, Reposition};
pub use reference::DynamicReference;
pub use service::{
    CmdResult, CommandHandler, ModeAction, ModeHandler, ModeSpec, ModeType, ServiceBody,
    ServiceKind, ServiceProvider, ServiceRegistry,
};
pub use session::{MemoryDirectory, Session, SessionDirectory, SessionObject, TargetType};
pub use version::{Version, VersionFlags};
