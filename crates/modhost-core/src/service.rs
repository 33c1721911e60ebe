//! Typed registry of named capabilities provided by plugins.
//!
//! [`ServiceRegistry`] indexes every [`ServiceProvider`] a plugin registers:
//!
//! | Kind       | Index                              | Key uniqueness               |
//! |------------|------------------------------------|------------------------------|
//! | `Command`  | verb → provider                    | exact name                   |
//! | `Mode`     | 52-slot letter table per mode type | letter slot and name         |
//! | `Metadata` | name → provider                    | exact name                   |
//! | `Data`     | name multimap                      | none (creator distinguishes) |
//! | `IoHook`   | name multimap                      | none (creator distinguishes) |
//!
//! Data and IoHook providers with a hierarchical name such as `sql/mysql` are
//! indexed under the full name and under both halves (`sql`, `mysql`). Mode
//! providers are additionally indexed in the same multimap as `mode/<name>`.
//! When several providers share a bucket the most recently inserted one wins
//! lookups.
//!
//! Every successful add or delete re-resolves all live
//! [`DynamicReference`]s before returning, so no reference ever points at a
//! provider that has left the registry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::extension::ExtensionItem;
use crate::reference::{DynamicReference, ReferenceTracker};
use crate::session::SessionObject;

/// Number of letters a mode table can hold (`A-Z`, `a-z`).
pub const MODE_SLOTS: usize = 52;

/// Prefix under which mode providers are indexed in the data multimap.
pub const MODE_PREFIX: &str = "mode/";

// =============================================================================
// Kinds
// =============================================================================

/// The kind of capability a provider offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// A client command keyed by verb.
    Command,
    /// A user or channel mode keyed by letter.
    Mode,
    /// An extension item (per-object metadata slot).
    Metadata,
    /// A generic data provider.
    Data,
    /// A socket I/O hook provider.
    IoHook,
}

impl ServiceKind {
    /// Returns the label used in errors and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Command => "command",
            ServiceKind::Mode => "mode",
            ServiceKind::Metadata => "metadata",
            ServiceKind::Data => "data",
            ServiceKind::IoHook => "iohook",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which letter table a mode lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeType {
    /// A mode set on users.
    User,
    /// A mode set on channels.
    Channel,
}

impl ModeType {
    fn index(self) -> usize {
        match self {
            ModeType::User => 0,
            ModeType::Channel => 1,
        }
    }
}

/// Maps a mode letter to its slot in a mode table.
pub fn mode_slot(letter: char) -> Option<usize> {
    match letter {
        'A'..='Z' => Some(letter as usize - 'A' as usize),
        'a'..='z' => Some(26 + letter as usize - 'a' as usize),
        _ => None,
    }
}

// =============================================================================
// Handler Traits
// =============================================================================

/// Outcome of a command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdResult {
    /// The command ran.
    Success,
    /// The command was refused or failed.
    Failure,
    /// The command was malformed.
    Invalid,
}

/// A client command consumed by the host's command dispatcher.
pub trait CommandHandler: Send + Sync {
    /// Minimum number of parameters the command accepts.
    fn min_params(&self) -> usize {
        0
    }

    /// Runs the command on behalf of `source`.
    fn handle(&self, source: &dyn SessionObject, params: &[String]) -> CmdResult;
}

/// Outcome of a mode change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    /// Apply the change.
    Allow,
    /// Drop the change.
    Deny,
}

/// A user or channel mode.
pub trait ModeHandler: Send + Sync {
    /// Returns `true` if the mode takes a parameter in this direction.
    fn needs_parameter(&self, _adding: bool) -> bool {
        false
    }

    /// Decides whether `source` may change the mode on `target`.
    fn on_change(
        &self,
        source: &dyn SessionObject,
        target: &dyn SessionObject,
        adding: bool,
        parameter: Option<&str>,
    ) -> ModeAction;
}

// =============================================================================
// ServiceProvider
// =============================================================================

/// Letter, table and handler of a mode provider.
#[derive(Clone)]
pub struct ModeSpec {
    /// Mode letter.
    pub letter: char,
    /// Table the letter lives in.
    pub mode_type: ModeType,
    /// The handler.
    pub handler: Arc<dyn ModeHandler>,
}

/// What a provider actually provides.
#[derive(Clone)]
pub enum ServiceBody {
    /// A command handler.
    Command(Arc<dyn CommandHandler>),
    /// A mode handler.
    Mode(ModeSpec),
    /// An extension item.
    Metadata(Arc<ExtensionItem>),
    /// An opaque data provider.
    Data(Arc<dyn Any + Send + Sync>),
    /// An opaque I/O hook provider.
    IoHook(Arc<dyn Any + Send + Sync>),
}

/// A named capability owned by exactly one plugin.
///
/// Providers are registered as `Arc<ServiceProvider>`; the `Arc` is the
/// provider's identity, so removal never touches an unrelated provider that
/// happens to share the name.
pub struct ServiceProvider {
    name: String,
    creator: String,
    body: ServiceBody,
}

impl ServiceProvider {
    /// Creates a provider from its parts.
    pub fn new(creator: impl Into<String>, name: impl Into<String>, body: ServiceBody) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            creator: creator.into(),
            body,
        })
    }

    /// Creates a command provider for `verb`.
    pub fn command(
        creator: impl Into<String>,
        verb: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Arc<Self> {
        Self::new(creator, verb, ServiceBody::Command(handler))
    }

    /// Creates a mode provider.
    pub fn mode(
        creator: impl Into<String>,
        name: impl Into<String>,
        letter: char,
        mode_type: ModeType,
        handler: Arc<dyn ModeHandler>,
    ) -> Arc<Self> {
        Self::new(
            creator,
            name,
            ServiceBody::Mode(ModeSpec {
                letter,
                mode_type,
                handler,
            }),
        )
    }

    /// Creates a metadata provider for an extension item.
    pub fn metadata(item: &Arc<ExtensionItem>) -> Arc<Self> {
        Self::new(
            item.creator(),
            item.name(),
            ServiceBody::Metadata(Arc::clone(item)),
        )
    }

    /// Creates a data provider.
    pub fn data<T: Any + Send + Sync>(
        creator: impl Into<String>,
        name: impl Into<String>,
        value: T,
    ) -> Arc<Self> {
        Self::new(creator, name, ServiceBody::Data(Arc::new(value)))
    }

    /// Creates an I/O hook provider.
    pub fn io_hook<T: Any + Send + Sync>(
        creator: impl Into<String>,
        name: impl Into<String>,
        value: T,
    ) -> Arc<Self> {
        Self::new(creator, name, ServiceBody::IoHook(Arc::new(value)))
    }

    /// Returns the provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the owning plugin.
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Returns the provider kind.
    pub fn kind(&self) -> ServiceKind {
        match self.body {
            ServiceBody::Command(_) => ServiceKind::Command,
            ServiceBody::Mode(_) => ServiceKind::Mode,
            ServiceBody::Metadata(_) => ServiceKind::Metadata,
            ServiceBody::Data(_) => ServiceKind::Data,
            ServiceBody::IoHook(_) => ServiceKind::IoHook,
        }
    }

    /// Returns what the provider provides.
    pub fn body(&self) -> &ServiceBody {
        &self.body
    }

    /// Returns the command handler of a command provider.
    pub fn as_command(&self) -> Option<&Arc<dyn CommandHandler>> {
        match &self.body {
            ServiceBody::Command(handler) => Some(handler),
            _ => None,
        }
    }

    /// Returns the mode spec of a mode provider.
    pub fn as_mode(&self) -> Option<&ModeSpec> {
        match &self.body {
            ServiceBody::Mode(spec) => Some(spec),
            _ => None,
        }
    }

    /// Returns the extension item of a metadata provider.
    pub fn as_extension(&self) -> Option<&Arc<ExtensionItem>> {
        match &self.body {
            ServiceBody::Metadata(item) => Some(item),
            _ => None,
        }
    }

    /// Downcasts the payload of a data or I/O hook provider.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match &self.body {
            ServiceBody::Data(value) | ServiceBody::IoHook(value) => {
                Arc::clone(value).downcast::<T>().ok()
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("kind", &self.kind())
            .field("name", &self.name)
            .field("creator", &self.creator)
            .finish()
    }
}

// =============================================================================
// ServiceRegistry
// =============================================================================

type ModeTable = [Option<Arc<ServiceProvider>>; MODE_SLOTS];

/// Typed store of every registered [`ServiceProvider`].
///
/// Also owns the set of live [`DynamicReference`]s and keeps them resolved.
pub struct ServiceRegistry {
    commands: HashMap<String, Arc<ServiceProvider>>,
    metadata: HashMap<String, Arc<ServiceProvider>>,
    modes: [ModeTable; 2],
    /// Data, IoHook and `mode/` entries. Buckets keep insertion order.
    data: BTreeMap<String, Vec<Arc<ServiceProvider>>>,
    references: ReferenceTracker,
}

impl ServiceRegistry {
    /// Creates an empty registry in its bootstrap phase.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            metadata: HashMap::new(),
            modes: std::array::from_fn(|_| std::array::from_fn(|_| None)),
            data: BTreeMap::new(),
            references: ReferenceTracker::default(),
        }
    }

    /// Registers a provider.
    ///
    /// Either every index entry for the provider is installed or, on error,
    /// none is.
    pub fn add_service(&mut self, provider: Arc<ServiceProvider>) -> ServiceResult<()> {
        let duplicate = || ServiceError::DuplicateService {
            kind: provider.kind(),
            name: provider.name().to_owned(),
        };

        match provider.body() {
            ServiceBody::Command(_) => {
                if self.commands.contains_key(provider.name()) {
                    return Err(duplicate());
                }
                self.commands
                    .insert(provider.name().to_owned(), Arc::clone(&provider));
            }
            ServiceBody::Mode(spec) => {
                let slot = mode_slot(spec.letter).ok_or(ServiceError::ModeLetterInvalid(spec.letter))?;
                let key = format!("{MODE_PREFIX}{}", provider.name());
                let table = &mut self.modes[spec.mode_type.index()];
                if table[slot].is_some() || self.data.contains_key(&key) {
                    return Err(duplicate());
                }
                table[slot] = Some(Arc::clone(&provider));
                self.data.entry(key).or_default().push(Arc::clone(&provider));
            }
            ServiceBody::Metadata(_) => {
                if self.metadata.contains_key(provider.name()) {
                    return Err(duplicate());
                }
                self.metadata
                    .insert(provider.name().to_owned(), Arc::clone(&provider));
            }
            ServiceBody::Data(_) | ServiceBody::IoHook(_) => {
                let name = provider.name();
                if name.starts_with(MODE_PREFIX) {
                    return Err(ServiceError::ReservedServiceName(name.to_owned()));
                }
                self.insert_data(name, &provider);
                if let Some((prefix, suffix)) = name.split_once('/') {
                    self.insert_data(prefix, &provider);
                    self.insert_data(suffix, &provider);
                }
            }
        }

        debug!(
            kind = %provider.kind(),
            name = %provider.name(),
            creator = %provider.creator(),
            "Service added"
        );
        self.resolve_all();
        Ok(())
    }

    fn insert_data(&mut self, key: &str, provider: &Arc<ServiceProvider>) {
        self.data
            .entry(key.to_owned())
            .or_default()
            .push(Arc::clone(provider));
    }

    /// Removes a provider from every index entry it occupies.
    ///
    /// Removal is by identity, never by name.
    pub fn del_service(&mut self, provider: &Arc<ServiceProvider>) -> ServiceResult<()> {
        let not_found = || ServiceError::ServiceNotFound {
            kind: provider.kind(),
            name: provider.name().to_owned(),
        };

        match provider.body() {
            ServiceBody::Command(_) => {
                Self::remove_keyed(&mut self.commands, provider).ok_or_else(not_found)?;
            }
            ServiceBody::Metadata(_) => {
                Self::remove_keyed(&mut self.metadata, provider).ok_or_else(not_found)?;
            }
            ServiceBody::Mode(spec) => {
                let slot = mode_slot(spec.letter).ok_or(ServiceError::ModeLetterInvalid(spec.letter))?;
                let entry = &mut self.modes[spec.mode_type.index()][slot];
                if !entry.as_ref().is_some_and(|p| Arc::ptr_eq(p, provider)) {
                    return Err(not_found());
                }
                *entry = None;
                self.remove_data(|p| Arc::ptr_eq(p, provider));
            }
            ServiceBody::Data(_) | ServiceBody::IoHook(_) => {
                self.remove_data(|p| Arc::ptr_eq(p, provider));
            }
        }

        debug!(
            kind = %provider.kind(),
            name = %provider.name(),
            creator = %provider.creator(),
            "Service removed"
        );
        self.resolve_all();
        Ok(())
    }

    fn remove_keyed(
        map: &mut HashMap<String, Arc<ServiceProvider>>,
        provider: &Arc<ServiceProvider>,
    ) -> Option<Arc<ServiceProvider>> {
        match map.get(provider.name()) {
            Some(existing) if Arc::ptr_eq(existing, provider) => map.remove(provider.name()),
            _ => None,
        }
    }

    /// Removes matching providers from every data bucket, dropping empty buckets.
    fn remove_data(&mut self, mut matches: impl FnMut(&Arc<ServiceProvider>) -> bool) {
        self.data.retain(|_, bucket| {
            bucket.retain(|p| !matches(p));
            !bucket.is_empty()
        });
    }

    /// Removes every provider created by `creator` without re-resolving.
    ///
    /// Scans both mode tables slot by slot, since there is no index from a
    /// plugin to its modes. Callers must run [`resolve_all`](Self::resolve_all)
    /// afterwards. Returns the removed providers.
    pub fn remove_owned_by(&mut self, creator: &str) -> Vec<Arc<ServiceProvider>> {
        let mut removed: Vec<Arc<ServiceProvider>> = Vec::new();
        let mut note = |p: &Arc<ServiceProvider>| {
            if !removed.iter().any(|r| Arc::ptr_eq(r, p)) {
                removed.push(Arc::clone(p));
            }
        };

        for table in &mut self.modes {
            for entry in table.iter_mut() {
                if entry.as_ref().is_some_and(|p| p.creator() == creator) {
                    if let Some(p) = entry.take() {
                        note(&p);
                    }
                }
            }
        }
        for map in [&mut self.commands, &mut self.metadata] {
            map.retain(|_, p| {
                let owned = p.creator() == creator;
                if owned {
                    note(&*p);
                }
                !owned
            });
        }
        self.data.retain(|_, bucket| {
            bucket.retain(|p| {
                let owned = p.creator() == creator;
                if owned {
                    note(p);
                }
                !owned
            });
            !bucket.is_empty()
        });

        removed
    }

    /// Exact-name lookup of a Data or IoHook provider.
    ///
    /// Only these two kinds are indexed by name in a way that makes this
    /// lookup meaningful; other kinds have their own finders
    /// ([`find_command`](Self::find_command), [`find_mode`](Self::find_mode),
    /// [`find_extension`](Self::find_extension)) and report
    /// [`ServiceError::UnknownServiceKind`] here.
    pub fn find_service(&self, kind: ServiceKind, name: &str) -> ServiceResult<Option<Arc<ServiceProvider>>> {
        match kind {
            ServiceKind::Data | ServiceKind::IoHook => Ok(self
                .data
                .get(name)
                .and_then(|bucket| bucket.iter().rev().find(|p| p.kind() == kind))
                .cloned()),
            other => Err(ServiceError::UnknownServiceKind(other)),
        }
    }

    /// Returns the command registered for `verb`.
    pub fn find_command(&self, verb: &str) -> Option<Arc<ServiceProvider>> {
        self.commands.get(verb).cloned()
    }

    /// Returns the mode installed at `letter` in the table for `mode_type`.
    pub fn find_mode(&self, letter: char, mode_type: ModeType) -> Option<Arc<ServiceProvider>> {
        mode_slot(letter).and_then(|slot| self.modes[mode_type.index()][slot].clone())
    }

    /// Returns the metadata provider registered as `name`.
    pub fn find_extension(&self, name: &str) -> Option<Arc<ServiceProvider>> {
        self.metadata.get(name).cloned()
    }

    /// Returns every provider created by `creator`.
    pub fn providers_of(&self, creator: &str) -> Vec<Arc<ServiceProvider>> {
        self.unique_providers()
            .into_iter()
            .filter(|p| p.creator() == creator)
            .collect()
    }

    /// Number of distinct providers per kind.
    pub fn count_by_kind(&self) -> BTreeMap<ServiceKind, usize> {
        let mut counts = BTreeMap::new();
        for provider in self.unique_providers() {
            *counts.entry(provider.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of distinct registered providers.
    pub fn len(&self) -> usize {
        self.unique_providers().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.metadata.is_empty() && self.data.is_empty()
    }

    fn unique_providers(&self) -> Vec<Arc<ServiceProvider>> {
        let mut seen = HashSet::new();
        self.commands
            .values()
            .chain(self.metadata.values())
            .chain(self.modes.iter().flatten().flatten())
            .chain(self.data.values().flatten())
            .filter(|p| seen.insert(Arc::as_ptr(*p)))
            .cloned()
            .collect()
    }

    // ─── Dynamic references ──────────────────────────────────────────────────

    /// Most recently inserted provider in the bucket for `name`, of any kind.
    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<ServiceProvider>> {
        self.data.get(name).and_then(|bucket| bucket.last()).cloned()
    }

    /// Creates a tracked reference to the provider named `name`.
    ///
    /// Resolves immediately once the registry has left its bootstrap phase;
    /// before that the reference stays absent until the first
    /// [`resolve_all`](Self::resolve_all).
    pub fn dynamic_reference(&self, name: impl Into<String>) -> DynamicReference {
        self.references.track(name.into(), |n| self.lookup(n))
    }

    /// Re-resolves every live reference and ends the bootstrap phase.
    pub fn resolve_all(&self) {
        self.references.resolve_all(|n| self.lookup(n));
    }

    /// Returns `true` once the first global resolve pass has run.
    pub fn is_bootstrapped(&self) -> bool {
        self.references.is_ready()
    }

    /// Number of live references.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.count_by_kind())
            .field("references", &self.reference_count())
            .finish()
    }
}
