//! The root runtime instance: plugin table, lifecycle and dispatch.
//!
//! [`PluginRuntime`] owns every piece of mutable state (the plugin table,
//! the [`ServiceRegistry`], the [`HookTable`] and the cull list) and is
//! mutated through `&mut self` from a single control thread. Foreign threads
//! reach it through [`ControlHandle`](crate::control::ControlHandle).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use modhost_runtime::PluginRuntime;
//!
//! let mut runtime = PluginRuntime::builder()
//!     .directory(users.clone())
//!     .directory(channels.clone())
//!     .build()?;
//!
//! runtime.load_plugin("m_sqlite", SqlitePlugin::default())?;
//! runtime.dispatch(&UserJoined { .. });
//! runtime.unload("m_sqlite")?;
//! runtime.flush_culls();
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use modhost_core::{
    Event, EventKind, FileCache, HookTable, LoadModule, ModResult, PluginError, PluginResult,
    Priority, ServiceRegistry, SessionDirectory, UnloadModule, VersionFlags,
};
use tracing::{debug, debug_span, error, info, warn};

use crate::config::{ModhostConfig, RuntimeSettings};
use crate::context::PluginContext;
use crate::cull::CullList;
use crate::error::RuntimeResult;
use crate::logging;
use crate::plugin::{Module, ModuleRef, Plugin};

/// Collaborator that republishes the host's capability list.
///
/// The runtime only signals that services changed; building and sending
/// the advertisement is up to the implementation.
pub trait CapabilityAdvertiser: Send + Sync {
    /// Called after a plugin finished loading or unloading.
    fn rebuild(&self, services: &ServiceRegistry);
}

/// The plugin runtime.
pub struct PluginRuntime {
    settings: RuntimeSettings,
    /// Live plugins by name.
    plugins: BTreeMap<String, ModuleRef>,
    services: ServiceRegistry,
    hooks: HookTable<ModuleRef>,
    directories: Vec<Arc<dyn SessionDirectory>>,
    advertiser: Option<Arc<dyn CapabilityAdvertiser>>,
    files: FileCache,
    culls: CullList,
    last_error: Option<String>,
    /// Current pass while `prioritize_all` runs.
    priority_pass: Option<u32>,
    /// Number of plugin hooks currently on the stack.
    hook_depth: usize,
}

impl PluginRuntime {
    /// Creates a runtime with default settings and no collaborators.
    pub fn new() -> Self {
        Self::with_parts(RuntimeSettings::default(), Vec::new(), None, FileCache::new())
    }

    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging and preloads the configured files.
    pub fn from_config(config: &ModhostConfig) -> RuntimeResult<Self> {
        RuntimeBuilder::from_config(config).build()
    }

    fn with_parts(
        settings: RuntimeSettings,
        directories: Vec<Arc<dyn SessionDirectory>>,
        advertiser: Option<Arc<dyn CapabilityAdvertiser>>,
        files: FileCache,
    ) -> Self {
        Self {
            settings,
            plugins: BTreeMap::new(),
            services: ServiceRegistry::new(),
            hooks: HookTable::new(),
            directories,
            advertiser,
            files,
            culls: CullList::new(),
            last_error: None,
            priority_pass: None,
            hook_depth: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the runtime settings.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Returns the service registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Returns the service registry for host-owned registrations.
    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.services
    }

    /// Returns the hook table.
    pub fn hooks(&self) -> &HookTable<ModuleRef> {
        &self.hooks
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut HookTable<ModuleRef> {
        &mut self.hooks
    }

    /// Returns the preloaded text resources.
    pub fn files(&self) -> &FileCache {
        &self.files
    }

    /// Returns the message of the most recent refused or failed lifecycle
    /// operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Looks up a loaded plugin.
    pub fn find(&self, name: &str) -> Option<ModuleRef> {
        self.plugins.get(name).cloned()
    }

    /// Number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Returns the names of loaded plugins, sorted.
    ///
    /// An empty filter lists every plugin; otherwise only plugins whose
    /// version flags intersect the filter are listed.
    pub fn list_names(&self, filter: VersionFlags) -> Vec<String> {
        self.plugins
            .values()
            .filter(|m| filter.is_empty() || m.version().flags.intersects(filter))
            .map(|m| m.name().to_owned())
            .collect()
    }

    /// Returns a snapshot of runtime counters.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            plugins: self.plugins.len(),
            dying: self.plugins.values().filter(|m| m.is_dying()).count(),
            services: self.services.len(),
            subscriptions: self.hooks.subscription_count(),
            references: self.services.reference_count(),
            pending_culls: self.culls.len(),
        }
    }

    fn fail<T>(&mut self, err: PluginError) -> PluginResult<T> {
        self.last_error = Some(err.to_string());
        Err(err)
    }

    fn advertise(&self) {
        if let Some(advertiser) = &self.advertiser {
            advertiser.rebuild(&self.services);
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads a plugin under `name`.
    ///
    /// Runs the plugin's `init`; on failure everything it registered is
    /// rolled back and [`PluginError::InitFailed`] is returned. On success
    /// the other plugins are notified, hook priorities are recomputed and the
    /// capability advertisement is rebuilt.
    pub fn load_plugin(&mut self, name: impl Into<String>, plugin: impl Plugin) -> PluginResult<ModuleRef> {
        self.load_boxed(name.into(), Box::new(plugin))
    }

    /// Loads an already boxed plugin.
    pub fn load_boxed(&mut self, name: String, plugin: Box<dyn Plugin>) -> PluginResult<ModuleRef> {
        if self.plugins.contains_key(&name) {
            warn!(plugin = %name, "Plugin is already loaded");
            return self.fail(PluginError::AlreadyLoaded(name));
        }

        let module = Module::new(name.clone(), plugin);
        self.plugins.insert(name.clone(), Arc::clone(&module));

        let result = {
            let mut ctx = PluginContext::new(self, Arc::clone(&module));
            module.plugin().init(&mut ctx)
        };

        if let Err(e) = result {
            self.discard(&module);
            error!(plugin = %name, error = %e, "Plugin failed to initialise, rolled back");
            return self.fail(PluginError::InitFailed {
                name,
                reason: e.to_string(),
            });
        }

        info!(
            plugin = %name,
            description = %module.version().description,
            "Plugin loaded"
        );

        self.dispatch(&LoadModule { name });
        self.prioritize_all();
        self.advertise();
        Ok(module)
    }

    /// Removes everything a plugin that failed to initialise registered.
    fn discard(&mut self, module: &ModuleRef) {
        self.services.remove_owned_by(module.name());
        self.services.resolve_all();
        self.hooks.detach_all(module);
        if self.find(module.name()).is_some_and(|m| Arc::ptr_eq(&m, module)) {
            self.plugins.remove(module.name());
        }
        self.culls.push(Arc::clone(module));
    }

    /// Runs every plugin's `prioritize` hook until a pass moves nothing.
    ///
    /// `First` and `Last` rules are applied on the first pass only; later
    /// passes settle `Before`/`After` rules around them. Gives up after
    /// `priority_passes` passes and keeps the current order; contradictory
    /// constraints are not detected. Returns `true` if the order converged.
    pub fn prioritize_all(&mut self) -> bool {
        let outer = self.priority_pass;
        let converged = self.run_priority_passes();
        self.priority_pass = outer;
        converged
    }

    fn run_priority_passes(&mut self) -> bool {
        let passes = self.settings.priority_passes;
        for pass in 1..=passes {
            self.priority_pass = Some(pass);
            let before = self.hooks.reorders();
            let modules: Vec<ModuleRef> = self.plugins.values().cloned().collect();
            for module in modules {
                let mut ctx = PluginContext::new(self, Arc::clone(&module));
                module.plugin().prioritize(&mut ctx);
            }
            if self.hooks.reorders() == before {
                debug!(passes = pass, "Hook priorities converged");
                return true;
            }
        }
        warn!(passes, "Hook priorities did not converge, keeping current order");
        false
    }

    /// Whether `First`/`Last` rules were already placed by an earlier pass.
    pub(crate) fn edge_rules_placed(&self) -> bool {
        self.priority_pass.is_some_and(|pass| pass > 1)
    }

    /// Converts a rule naming plugins into one over plugin handles.
    ///
    /// `None` when the pivot is not loaded.
    pub(crate) fn resolve_rule(&self, rule: Priority<&str>) -> Option<Priority<ModuleRef>> {
        Some(match rule {
            Priority::First => Priority::First,
            Priority::Last => Priority::Last,
            Priority::Before(name) => Priority::Before(self.find(name)?),
            Priority::After(name) => Priority::After(self.find(name)?),
        })
    }

    // =========================================================================
    // Unloading
    // =========================================================================

    /// Checks whether `name` may be unloaded and, if so, marks it Dying.
    pub fn can_unload(&mut self, name: &str) -> PluginResult<ModuleRef> {
        let Some(module) = self.find(name) else {
            warn!(plugin = %name, "Unload refused: plugin is not loaded");
            return self.fail(PluginError::PluginNotLoaded(name.to_owned()));
        };
        if module.is_dying() {
            warn!(plugin = %name, "Unload refused: plugin is already being unloaded");
            return self.fail(PluginError::AlreadyDying(name.to_owned()));
        }
        if module.version().is_static() {
            warn!(plugin = %name, "Unload refused: plugin is static");
            return self.fail(PluginError::NonUnloadable(name.to_owned()));
        }
        module.mark_dying();
        Ok(module)
    }

    /// Removes every trace of a plugin accepted by [`can_unload`](Self::can_unload).
    ///
    /// The plugin object itself is queued on the cull list and released by
    /// the next [`flush_culls`](Self::flush_culls). Returns `false` without
    /// doing anything if `module` is not the plugin loaded under its name.
    pub fn do_safe_unload(&mut self, module: &ModuleRef) -> bool {
        let name = module.name().to_owned();
        if !self.is_loaded(module) {
            debug!(plugin = %name, "Skipping unload of a plugin that is not loaded");
            return false;
        }
        let span = debug_span!("unload", plugin = %name);
        let _enter = span.enter();

        // Dependents release their references while the target is still
        // registered.
        let notice = UnloadModule { name: name.clone() };
        for subscriber in self.hooks.snapshot(EventKind::UnloadModule) {
            if Arc::ptr_eq(&subscriber, module)
                || !self.hooks.is_attached(EventKind::UnloadModule, &subscriber)
            {
                continue;
            }
            let mut ctx = PluginContext::new(self, Arc::clone(&subscriber));
            subscriber.plugin().on_event(&mut ctx, &notice);
        }

        let mut stripped = 0;
        for directory in self.directories.clone() {
            for object in directory.snapshot() {
                module.plugin().on_cleanup(object.as_ref());
                stripped += object.strip_extensions(&name);
                for member in object.members() {
                    stripped += member.strip_extensions(&name);
                }
            }
        }

        let removed = self.services.remove_owned_by(&name);
        self.services.resolve_all();
        self.hooks.detach_all(module);

        // A handler may have unloaded it already during the notice.
        if self.is_loaded(module) {
            self.plugins.remove(&name);
            self.culls.push(Arc::clone(module));
        }
        self.advertise();

        info!(
            plugin = %name,
            services = removed.len(),
            extensions = stripped,
            "Plugin unloaded"
        );
        true
    }

    fn is_loaded(&self, module: &ModuleRef) -> bool {
        self.plugins.get(module.name()).is_some_and(|m| Arc::ptr_eq(m, module))
    }

    /// [`can_unload`](Self::can_unload) followed by
    /// [`do_safe_unload`](Self::do_safe_unload).
    pub fn unload(&mut self, name: &str) -> PluginResult<()> {
        let module = self.can_unload(name)?;
        self.do_safe_unload(&module);
        Ok(())
    }

    /// Unloads every plugin, retrying for `unload_passes` passes.
    ///
    /// The cull list is flushed after each pass unless a plugin hook is
    /// running, in which case culling waits for the next flush. Returns the
    /// number of plugins still loaded afterwards (static plugins always
    /// remain).
    pub fn unload_all(&mut self) -> usize {
        for pass in 1..=self.settings.unload_passes {
            let names: Vec<String> = self.plugins.keys().cloned().collect();
            for name in names {
                if let Ok(module) = self.can_unload(&name) {
                    self.do_safe_unload(&module);
                }
            }
            self.flush_culls();
            debug!(pass, remaining = self.plugins.len(), "Unload pass complete");
            if self.plugins.is_empty() {
                break;
            }
        }

        let remaining = self.plugins.len();
        if remaining > 0 {
            warn!(
                remaining,
                plugins = ?self.plugins.keys().collect::<Vec<_>>(),
                "Plugins still loaded after unload passes"
            );
        }
        remaining
    }

    /// Releases every plugin queued for destruction.
    ///
    /// Does nothing while a plugin hook is running, since that plugin may be
    /// on the list.
    pub fn flush_culls(&mut self) -> usize {
        if self.hook_depth > 0 {
            debug!(pending = self.culls.len(), "Cull deferred, plugin code is running");
            return 0;
        }
        self.culls.apply()
    }

    pub(crate) fn enter_hook(&mut self) {
        self.hook_depth += 1;
    }

    pub(crate) fn leave_hook(&mut self) {
        self.hook_depth = self.hook_depth.saturating_sub(1);
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Calls every subscriber of the event's kind, in order.
    ///
    /// Iterates a snapshot; subscribers detached by an earlier handler during
    /// this dispatch are skipped.
    pub fn dispatch(&mut self, event: &dyn Event) {
        let kind = event.kind();
        for module in self.hooks.snapshot(kind) {
            if !self.hooks.is_attached(kind, &module) {
                continue;
            }
            let mut ctx = PluginContext::new(self, Arc::clone(&module));
            module.plugin().on_event(&mut ctx, event);
        }
    }

    /// Calls subscribers in order until one returns a decided result.
    ///
    /// Returns [`ModResult::Passthru`] if nobody decided.
    pub fn dispatch_until_decided(&mut self, event: &dyn Event) -> ModResult {
        let kind = event.kind();
        for module in self.hooks.snapshot(kind) {
            if !self.hooks.is_attached(kind, &module) {
                continue;
            }
            let mut ctx = PluginContext::new(self, Arc::clone(&module));
            let result = module.plugin().on_event(&mut ctx, event);
            if result.is_decided() {
                debug!(%kind, plugin = %module.name(), ?result, "Event decided");
                return result;
            }
        }
        ModResult::Passthru
    }
}

impl Default for PluginRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("services", &self.services)
            .field("hooks", &self.hooks)
            .field("pending_culls", &self.culls.len())
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`PluginRuntime`] with collaborators attached.
#[derive(Default)]
pub struct RuntimeBuilder {
    settings: RuntimeSettings,
    directories: Vec<Arc<dyn SessionDirectory>>,
    advertiser: Option<Arc<dyn CapabilityAdvertiser>>,
    files: FileCache,
    preload: Vec<std::path::PathBuf>,
}

impl RuntimeBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from configuration and initializes logging.
    pub fn from_config(config: &ModhostConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            preload = config.files.preload.len(),
            "Runtime initialized from configuration"
        );

        Self {
            settings: config.runtime.clone(),
            preload: config.files.preload.clone(),
            ..Self::default()
        }
    }

    /// Replaces the runtime settings.
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds a session-object directory visited during unload.
    pub fn directory(mut self, directory: Arc<dyn SessionDirectory>) -> Self {
        self.directories.push(directory);
        self
    }

    /// Sets the capability-advertisement collaborator.
    pub fn advertiser(mut self, advertiser: Arc<dyn CapabilityAdvertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Uses an existing file cache.
    pub fn file_cache(mut self, files: FileCache) -> Self {
        self.files = files;
        self
    }

    /// Adds a file to read into the cache at build time.
    pub fn preload(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.preload.push(path.into());
        self
    }

    /// Builds the runtime, reading every preloaded file.
    pub fn build(self) -> RuntimeResult<PluginRuntime> {
        let mut files = self.files;
        for path in &self.preload {
            files.preload(path)?;
        }
        Ok(PluginRuntime::with_parts(
            self.settings,
            self.directories,
            self.advertiser,
            files,
        ))
    }
}

// =============================================================================
// RuntimeStats
// =============================================================================

/// Counters describing the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Loaded plugins, including dying ones not yet removed.
    pub plugins: usize,
    /// Plugins marked Dying.
    pub dying: usize,
    /// Distinct registered services.
    pub services: usize,
    /// Event subscriptions across all kinds.
    pub subscriptions: usize,
    /// Live dynamic references.
    pub references: usize,
    /// Plugins waiting on the cull list.
    pub pending_culls: usize,
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Plugins: {} ({} dying), {} services, {} subscriptions, {} references, {} pending culls",
            self.plugins,
            self.dying,
            self.services,
            self.subscriptions,
            self.references,
            self.pending_culls
        )
    }
}
