//! Per-object data that plugins attach to session objects.
//!
//! An [`ExtensionItem`] is the key a plugin registers (as a Metadata service)
//! and then uses to hang values off users, channels and memberships. The
//! session object stores the values in its [`Extensible`] but does not own
//! their meaning: when the creating plugin unloads, every value keyed by one
//! of its items is stripped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A named slot for per-object data, owned by the plugin that created it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ExtensionItem {
    name: String,
    creator: String,
}

impl ExtensionItem {
    /// Creates an item named `name` owned by the plugin `creator`.
    pub fn new(creator: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            creator: creator.into(),
        })
    }

    /// Returns the item name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the owning plugin.
    pub fn creator(&self) -> &str {
        &self.creator
    }
}

struct Slot {
    item: Arc<ExtensionItem>,
    value: Box<dyn Any + Send + Sync>,
}

/// Extension storage embedded in every session object.
#[derive(Default)]
pub struct Extensible {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Extensible {
    /// Creates empty extension storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `item`, replacing any previous value.
    ///
    /// Returns `true` if a previous value was replaced.
    pub fn set<T: Any + Send + Sync>(&self, item: &Arc<ExtensionItem>, value: T) -> bool {
        self.slots
            .lock()
            .insert(
                item.name().to_owned(),
                Slot {
                    item: Arc::clone(item),
                    value: Box::new(value),
                },
            )
            .is_some()
    }

    /// Returns a clone of the value stored under `item`.
    ///
    /// `None` when nothing is stored, when the stored value has another type,
    /// or when the slot belongs to a different item of the same name.
    pub fn get<T: Any + Clone>(&self, item: &Arc<ExtensionItem>) -> Option<T> {
        let slots = self.slots.lock();
        let slot = slots.get(item.name())?;
        if !Arc::ptr_eq(&slot.item, item) {
            return None;
        }
        slot.value.downcast_ref::<T>().cloned()
    }

    /// Removes the value stored under `item`. Returns `true` if one existed.
    pub fn unset(&self, item: &Arc<ExtensionItem>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(item.name()) {
            Some(slot) if Arc::ptr_eq(&slot.item, item) => {
                slots.remove(item.name());
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if a value is stored under `item`.
    pub fn contains(&self, item: &Arc<ExtensionItem>) -> bool {
        self.slots
            .lock()
            .get(item.name())
            .is_some_and(|slot| Arc::ptr_eq(&slot.item, item))
    }

    /// Removes every value whose item was created by `creator`.
    ///
    /// Returns the number of values removed.
    pub fn unhook_owned_by(&self, creator: &str) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.item.creator() != creator);
        before - slots.len()
    }

    /// Number of values currently stored.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl fmt::Debug for Extensible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut names: Vec<&str> = slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Extensible").field("items", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_unset() {
        let ext = Extensible::new();
        let item = ExtensionItem::new("m_away", "away_since");
        assert!(!ext.set(&item, 42_u64));
        assert_eq!(ext.get::<u64>(&item), Some(42));
        assert_eq!(ext.get::<String>(&item), None);
        assert!(ext.set(&item, 43_u64));
        assert!(ext.unset(&item));
        assert!(!ext.contains(&item));
    }

    #[test]
    fn test_same_name_other_item_is_not_visible() {
        let ext = Extensible::new();
        let mine = ExtensionItem::new("m_a", "tag");
        let theirs = ExtensionItem::new("m_b", "tag");
        ext.set(&mine, "x".to_string());
        assert_eq!(ext.get::<String>(&theirs), None);
        assert!(!ext.unset(&theirs));
        assert!(ext.contains(&mine));
    }

    #[test]
    fn test_unhook_owned_by_only_strips_creator() {
        let ext = Extensible::new();
        let a1 = ExtensionItem::new("m_a", "one");
        let a2 = ExtensionItem::new("m_a", "two");
        let b = ExtensionItem::new("m_b", "three");
        ext.set(&a1, 1_i32);
        ext.set(&a2, 2_i32);
        ext.set(&b, 3_i32);
        assert_eq!(ext.unhook_owned_by("m_a"), 2);
        assert_eq!(ext.len(), 1);
        assert_eq!(ext.get::<i32>(&b), Some(3));
        assert_eq!(ext.unhook_owned_by("m_a"), 0);
    }
}
