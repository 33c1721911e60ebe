//! The view of the runtime a plugin gets while one of its hooks runs.

use std::sync::Arc;

use modhost_core::{
    DynamicReference, Event, EventKind, FileCache, ModResult, Priority, Reposition,
    ServiceProvider, ServiceRegistry, ServiceResult,
};

use crate::plugin::ModuleRef;
use crate::runtime::PluginRuntime;

/// Runtime access scoped to the plugin whose hook is running.
///
/// Subscriptions and priority rules made through the context apply to that
/// plugin. [`runtime`](Self::runtime) gives unrestricted access, including
/// unloading plugins, from inside a handler.
pub struct PluginContext<'rt> {
    runtime: &'rt mut PluginRuntime,
    module: ModuleRef,
}

impl<'rt> PluginContext<'rt> {
    pub(crate) fn new(runtime: &'rt mut PluginRuntime, module: ModuleRef) -> Self {
        runtime.enter_hook();
        Self { runtime, module }
    }

    /// Name of the plugin this context belongs to.
    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Handle of the plugin this context belongs to.
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    /// The whole runtime.
    pub fn runtime(&mut self) -> &mut PluginRuntime {
        self.runtime
    }

    // ─── Services ────────────────────────────────────────────────────────────

    /// The service registry.
    pub fn services(&self) -> &ServiceRegistry {
        self.runtime.services()
    }

    /// Registers a provider.
    pub fn add_service(&mut self, provider: Arc<ServiceProvider>) -> ServiceResult<()> {
        self.runtime.services_mut().add_service(provider)
    }

    /// Removes a provider.
    pub fn del_service(&mut self, provider: &Arc<ServiceProvider>) -> ServiceResult<()> {
        self.runtime.services_mut().del_service(provider)
    }

    /// Creates a tracked reference to the provider named `name`.
    pub fn dynamic_reference(&self, name: impl Into<String>) -> DynamicReference {
        self.runtime.services().dynamic_reference(name)
    }

    /// Preloaded text resources.
    pub fn files(&self) -> &FileCache {
        self.runtime.files()
    }

    // ─── Hooks ───────────────────────────────────────────────────────────────

    /// Subscribes this plugin to `kind`. Returns `false` if already subscribed.
    pub fn attach(&mut self, kind: EventKind) -> bool {
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().attach(kind, module)
    }

    /// Subscribes this plugin to every kind in `kinds`.
    pub fn attach_many(&mut self, kinds: &[EventKind]) {
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().attach_many(kinds, &module);
    }

    /// Unsubscribes this plugin from `kind`. Returns `false` if not subscribed.
    pub fn detach(&mut self, kind: EventKind) -> bool {
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().detach(kind, &module)
    }

    /// Unsubscribes this plugin from every kind.
    pub fn detach_all(&mut self) {
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().detach_all(&module);
    }

    /// Moves this plugin within the subscribers of `kind`.
    ///
    /// Pivots are plugin names. A pivot that is not loaded counts as not
    /// attached, so the rule is already satisfied. During prioritization,
    /// `First` and `Last` only move the plugin on the first pass.
    pub fn set_priority(&mut self, kind: EventKind, rule: Priority<&str>) -> Reposition {
        let placed = self.edge_rule_placed(&rule);
        let Some(rule) = self.runtime.resolve_rule(rule).filter(|_| !placed) else {
            return if self.runtime.hooks().is_attached(kind, &self.module) {
                Reposition::Satisfied
            } else {
                Reposition::NotAttached
            };
        };
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().set_priority(kind, &module, &rule)
    }

    /// Applies `rule` on every kind this plugin is subscribed to.
    ///
    /// Returns `true` if anything moved.
    pub fn set_priority_all(&mut self, rule: Priority<&str>) -> bool {
        if self.edge_rule_placed(&rule) {
            return false;
        }
        let Some(rule) = self.runtime.resolve_rule(rule) else {
            return false;
        };
        let module = Arc::clone(&self.module);
        self.runtime.hooks_mut().set_priority_all(&module, &rule)
    }

    fn edge_rule_placed(&self, rule: &Priority<&str>) -> bool {
        matches!(rule, Priority::First | Priority::Last) && self.runtime.edge_rules_placed()
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Dispatches a nested event to every subscriber.
    pub fn dispatch(&mut self, event: &dyn Event) {
        self.runtime.dispatch(event);
    }

    /// Dispatches a nested event until a subscriber decides.
    pub fn dispatch_until_decided(&mut self, event: &dyn Event) -> ModResult {
        self.runtime.dispatch_until_decided(event)
    }
}

impl Drop for PluginContext<'_> {
    fn drop(&mut self) {
        self.runtime.leave_hook();
    }
}
