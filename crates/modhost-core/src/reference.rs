//! Late-bound handles to Data and IoHook providers.
//!
//! A [`DynamicReference`] names a provider rather than holding it. The
//! [`ServiceRegistry`] tracks every live reference and re-binds all of them
//! after each registration change, so a reference either points at the
//! current provider for its name or is absent. It never keeps a removed
//! provider alive: the binding is a [`Weak`] pointer.
//!
//! Dropping a reference unregisters it. Once the last reference goes away the
//! tracked set itself is released.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::service::{ServiceProvider, ServiceRegistry};

/// Name and current binding of one reference.
struct RefSlot {
    name: Mutex<String>,
    target: Mutex<Weak<ServiceProvider>>,
}

impl RefSlot {
    fn new(name: String) -> Self {
        Self {
            name: Mutex::new(name),
            target: Mutex::new(Weak::new()),
        }
    }

    fn resolve_with(&self, lookup: &impl Fn(&str) -> Option<Arc<ServiceProvider>>) {
        let found = lookup(&self.name.lock());
        *self.target.lock() = found.as_ref().map(Arc::downgrade).unwrap_or_default();
    }
}

#[derive(Default)]
struct TrackerState {
    /// `None` until the first reference is created and again after the last
    /// one is dropped.
    refs: Option<Vec<Arc<RefSlot>>>,
    /// Set by the first global resolve pass.
    ready: bool,
}

/// The set of live references owned by a registry.
#[derive(Default)]
pub(crate) struct ReferenceTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ReferenceTracker {
    pub(crate) fn track(
        &self,
        name: String,
        lookup: impl Fn(&str) -> Option<Arc<ServiceProvider>>,
    ) -> DynamicReference {
        let slot = Arc::new(RefSlot::new(name));
        let mut state = self.state.lock();
        state.refs.get_or_insert_with(Vec::new).push(Arc::clone(&slot));
        if state.ready {
            slot.resolve_with(&lookup);
        }
        DynamicReference {
            slot,
            tracker: Arc::downgrade(&self.state),
        }
    }

    pub(crate) fn resolve_all(&self, lookup: impl Fn(&str) -> Option<Arc<ServiceProvider>>) {
        let mut state = self.state.lock();
        state.ready = true;
        for slot in state.refs.iter().flatten() {
            slot.resolve_with(&lookup);
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().refs.as_ref().map_or(0, Vec::len)
    }
}

/// A tracked, late-bound handle to the provider registered under a name.
pub struct DynamicReference {
    slot: Arc<RefSlot>,
    tracker: Weak<Mutex<TrackerState>>,
}

impl DynamicReference {
    /// Returns the name this reference looks up.
    pub fn name(&self) -> String {
        self.slot.name.lock().clone()
    }

    /// Points the reference at another name and re-resolves it.
    pub fn set_provider(&self, registry: &ServiceRegistry, name: impl Into<String>) {
        *self.slot.name.lock() = name.into();
        self.resolve(registry);
    }

    /// Re-binds this reference only.
    pub fn resolve(&self, registry: &ServiceRegistry) {
        self.slot.resolve_with(&|n: &str| registry.lookup(n));
    }

    /// Returns the bound provider, or `None` if nothing is registered under
    /// the name.
    pub fn get(&self) -> Option<Arc<ServiceProvider>> {
        self.slot.target.lock().upgrade()
    }

    /// Returns `true` if a provider is bound.
    pub fn is_available(&self) -> bool {
        self.slot.target.lock().strong_count() > 0
    }

    /// Returns the bound provider's payload as `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get()?.downcast::<T>()
    }
}

impl Drop for DynamicReference {
    fn drop(&mut self) {
        let Some(state) = self.tracker.upgrade() else {
            return;
        };
        let mut state = state.lock();
        if let Some(refs) = state.refs.as_mut() {
            if let Some(index) = refs.iter().position(|s| Arc::ptr_eq(s, &self.slot)) {
                refs.swap_remove(index);
            }
            if refs.is_empty() {
                state.refs = None;
            }
        }
    }
}

impl fmt::Debug for DynamicReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicReference")
            .field("name", &self.name())
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::service::{ServiceKind, ServiceProvider, ServiceRegistry};

    #[test]
    fn test_unresolved_until_bootstrap_ends() {
        let mut registry = ServiceRegistry::new();
        let reference = registry.dynamic_reference("sql");
        assert!(!registry.is_bootstrapped());
        assert!(reference.get().is_none());

        registry
            .add_service(ServiceProvider::data("m_mysql", "sql/mysql", "conn".to_owned()))
            .unwrap();
        assert!(registry.is_bootstrapped());
        assert_eq!(reference.data::<String>().as_deref().map(String::as_str), Some("conn"));
    }

    #[test]
    fn test_created_after_bootstrap_resolves_immediately() {
        let mut registry = ServiceRegistry::new();
        registry
            .add_service(ServiceProvider::data("m_a", "cache", 1_u32))
            .unwrap();
        let reference = registry.dynamic_reference("cache");
        assert!(reference.is_available());
    }

    #[test]
    fn test_follows_registry_changes() {
        let mut registry = ServiceRegistry::new();
        registry.resolve_all();
        let reference = registry.dynamic_reference("cache");
        assert!(!reference.is_available());

        let first = ServiceProvider::data("m_a", "cache", 1_u32);
        let second = ServiceProvider::data("m_b", "cache", 2_u32);
        registry.add_service(first.clone()).unwrap();
        registry.add_service(second.clone()).unwrap();
        assert_eq!(reference.data::<u32>().as_deref(), Some(&2));

        registry.del_service(&second).unwrap();
        assert_eq!(reference.data::<u32>().as_deref(), Some(&1));

        registry.del_service(&first).unwrap();
        assert!(reference.get().is_none());
    }

    #[test]
    fn test_does_not_keep_removed_provider_alive() {
        let mut registry = ServiceRegistry::new();
        let provider = ServiceProvider::data("m_a", "cache", ());
        let weak = std::sync::Arc::downgrade(&provider);
        registry.add_service(provider).unwrap();
        let reference = registry.dynamic_reference("cache");
        assert!(reference.is_available());

        registry.remove_owned_by("m_a");
        registry.resolve_all();
        assert!(weak.upgrade().is_none());
        assert!(!reference.is_available());
    }

    #[test]
    fn test_set_provider_rebinds() {
        let mut registry = ServiceRegistry::new();
        registry
            .add_service(ServiceProvider::io_hook("m_ssl", "ssl/gnutls", ()))
            .unwrap();
        let reference = registry.dynamic_reference("missing");
        assert!(!reference.is_available());

        reference.set_provider(&registry, "gnutls");
        assert_eq!(reference.name(), "gnutls");
        assert_eq!(reference.get().unwrap().kind(), ServiceKind::IoHook);
    }

    #[test]
    fn test_drop_releases_tracked_set() {
        let registry = ServiceRegistry::new();
        let a = registry.dynamic_reference("a");
        let b = registry.dynamic_reference("b");
        let c = registry.dynamic_reference("c");
        assert_eq!(registry.reference_count(), 3);

        drop(a);
        assert_eq!(registry.reference_count(), 2);
        assert_eq!(b.name(), "b");
        drop(c);
        drop(b);
        assert_eq!(registry.reference_count(), 0);
    }

    #[test]
    fn test_outlives_registry() {
        let registry = ServiceRegistry::new();
        let reference = registry.dynamic_reference("a");
        drop(registry);
        assert!(reference.get().is_none());
        drop(reference);
    }
}
