//! Contracts consumed from the host's session-object stores.
//!
//! The runtime never owns users or channels. It only needs to enumerate them
//! while unloading a plugin, give the plugin a chance to tidy its per-object
//! state, and strip the plugin's [`ExtensionItem`]s from every object.
//!
//! [`ExtensionItem`]: crate::extension::ExtensionItem

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::extension::Extensible;

/// The kind of a session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A connected user.
    User,
    /// A channel.
    Channel,
    /// A user's membership in a channel.
    Membership,
}

/// A long-lived host entity that plugins may attach data to.
pub trait SessionObject: Send + Sync {
    /// Returns the object's kind.
    fn target_type(&self) -> TargetType;

    /// Returns a stable identifier (nick, UID, channel name, ...).
    fn id(&self) -> &str;

    /// Returns the object's extension storage.
    fn extensions(&self) -> &Extensible;

    /// Returns nested objects that carry their own extensions.
    ///
    /// Channels return their memberships here.
    fn members(&self) -> Vec<Arc<dyn SessionObject>> {
        Vec::new()
    }

    /// Strips every extension owned by `plugin`. Returns the number removed.
    fn strip_extensions(&self, plugin: &str) -> usize {
        self.extensions().unhook_owned_by(plugin)
    }
}

impl fmt::Debug for dyn SessionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionObject")
            .field("type", &self.target_type())
            .field("id", &self.id())
            .finish()
    }
}

/// A plain [`SessionObject`] holding only its id, extensions and members.
pub struct Session {
    target_type: TargetType,
    id: String,
    extensions: Extensible,
    members: RwLock<Vec<Arc<dyn SessionObject>>>,
}

impl Session {
    /// Creates an object of the given type.
    pub fn new(target_type: TargetType, id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            target_type,
            id: id.into(),
            extensions: Extensible::new(),
            members: RwLock::new(Vec::new()),
        })
    }

    /// Creates a user.
    pub fn user(id: impl Into<String>) -> Arc<Self> {
        Self::new(TargetType::User, id)
    }

    /// Creates a channel.
    pub fn channel(id: impl Into<String>) -> Arc<Self> {
        Self::new(TargetType::Channel, id)
    }

    /// Adds a membership of `user` to this channel and returns it.
    pub fn join(&self, user: &dyn SessionObject) -> Arc<Self> {
        let membership = Self::new(TargetType::Membership, format!("{}:{}", self.id, user.id()));
        self.members.write().push(membership.clone());
        membership
    }
}

impl SessionObject for Session {
    fn target_type(&self) -> TargetType {
        self.target_type
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn extensions(&self) -> &Extensible {
        &self.extensions
    }

    fn members(&self) -> Vec<Arc<dyn SessionObject>> {
        self.members.read().clone()
    }
}

/// A store of live session objects of one kind.
pub trait SessionDirectory: Send + Sync {
    /// Returns a label for logs ("users", "channels").
    fn name(&self) -> &str;

    /// Returns every live object.
    ///
    /// The returned list must stay valid while the caller iterates it, even if
    /// objects are added or removed from the directory in the meantime.
    fn snapshot(&self) -> Vec<Arc<dyn SessionObject>>;
}

/// An in-memory [`SessionDirectory`] keyed by object id.
pub struct MemoryDirectory {
    name: String,
    objects: RwLock<BTreeMap<String, Arc<dyn SessionObject>>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Inserts or replaces an object, returning the previous one.
    pub fn insert(&self, object: Arc<dyn SessionObject>) -> Option<Arc<dyn SessionObject>> {
        self.objects.write().insert(object.id().to_owned(), object)
    }

    /// Removes an object by id.
    pub fn remove(&self, id: &str) -> Option<Arc<dyn SessionObject>> {
        self.objects.write().remove(id)
    }

    /// Looks up an object by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn SessionObject>> {
        self.objects.read().get(id).cloned()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl SessionDirectory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionObject>> {
        self.objects.read().values().cloned().collect()
    }
}

impl fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDirectory")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionItem;

    #[test]
    fn test_strip_only_touches_owned_items() {
        let mine = ExtensionItem::new("m_a", "away");
        let theirs = ExtensionItem::new("m_b", "swhois");
        let user = Session::user("alice");
        user.extensions().set(&mine, "gone".to_owned());
        user.extensions().set(&theirs, 1_u32);

        assert_eq!(user.strip_extensions("m_a"), 1);
        assert!(!user.extensions().contains(&mine));
        assert!(user.extensions().contains(&theirs));
    }

    #[test]
    fn test_channel_lists_memberships() {
        let chan = Session::channel("#rust");
        let user = Session::user("bob");
        let membership = chan.join(user.as_ref());
        assert_eq!(membership.id(), "#rust:bob");
        assert_eq!(membership.target_type(), TargetType::Membership);
        assert_eq!(chan.members().len(), 1);
    }

    #[test]
    fn test_directory_snapshot_is_detached() {
        let dir = MemoryDirectory::new("users");
        dir.insert(Session::user("a"));
        dir.insert(Session::user("b"));
        let snapshot = dir.snapshot();
        dir.remove("a");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(dir.len(), 1);
        assert!(dir.get("b").is_some());
    }
}
