//! The plugin contract and the runtime's handle to a loaded plugin.

use std::fmt;
use std::sync::Arc;

use modhost_core::{Event, ModResult, SessionObject, Version};
use parking_lot::Mutex;

use crate::context::PluginContext;

/// Error type plugins return from [`Plugin::init`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A hot-loadable unit of behaviour.
///
/// Every method takes `&self`: a plugin can be re-entered while one of its
/// own handlers is running (a handler dispatching an event it also
/// subscribes to), so mutable state belongs behind interior mutability.
///
/// Plugins subscribe to the [`EventKind`](modhost_core::EventKind)s they
/// implement from [`init`](Plugin::init); [`on_event`](Plugin::on_event) is
/// only called for those kinds.
pub trait Plugin: Send + Sync + 'static {
    /// Describes the plugin. Read once at load time.
    fn version(&self) -> Version;

    /// Registers services and subscribes to events.
    ///
    /// On error everything registered so far is rolled back and the plugin
    /// is discarded.
    fn init(&self, _ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Applies hook ordering constraints.
    ///
    /// Called once per pass of the global prioritization loop after any
    /// plugin loads, so it must be idempotent.
    fn prioritize(&self, _ctx: &mut PluginContext<'_>) {}

    /// Handles one event of a subscribed kind.
    fn on_event(&self, _ctx: &mut PluginContext<'_>, _event: &dyn Event) -> ModResult {
        ModResult::Passthru
    }

    /// Releases per-object state held for `object` before this plugin's
    /// extensions are stripped from it during unload.
    fn on_cleanup(&self, _object: &dyn SessionObject) {}

    /// Final call before the runtime drops the plugin.
    fn cull(&self) {}
}

/// Lifecycle state of a loaded plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Loaded and serving.
    Active,
    /// Accepted for unload; a second unload request fails.
    Dying,
}

/// A loaded plugin with its identity and lifecycle state.
pub struct Module {
    name: String,
    version: Version,
    state: Mutex<PluginState>,
    plugin: Box<dyn Plugin>,
}

/// Shared handle to a loaded plugin. Equality is identity.
pub type ModuleRef = Arc<Module>;

impl Module {
    pub(crate) fn new(name: String, plugin: Box<dyn Plugin>) -> ModuleRef {
        let version = plugin.version();
        Arc::new(Self {
            name,
            version,
            state: Mutex::new(PluginState::Active),
            plugin,
        })
    }

    /// Returns the identity the loader gave this plugin.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version metadata captured at load time.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PluginState {
        *self.state.lock()
    }

    /// Returns `true` once the plugin has been accepted for unload.
    pub fn is_dying(&self) -> bool {
        self.state() == PluginState::Dying
    }

    pub(crate) fn mark_dying(&self) {
        *self.state.lock() = PluginState::Dying;
    }

    /// Returns the plugin implementation.
    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Module {}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("flags", &self.version.flags)
            .finish()
    }
}
