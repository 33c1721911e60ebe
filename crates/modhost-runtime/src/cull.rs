//! Deferred destruction of unloaded plugins.
//!
//! An unloaded plugin may still be on the call stack (it can unload itself
//! from one of its own handlers), so it is parked here and only released at
//! points where no plugin code is running.

use tracing::debug;

use crate::plugin::ModuleRef;

/// Plugins waiting to be destroyed.
#[derive(Debug, Default)]
pub struct CullList {
    pending: Vec<ModuleRef>,
}

impl CullList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a removed plugin.
    pub fn push(&mut self, module: ModuleRef) {
        self.pending.push(module);
    }

    /// Number of queued plugins.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Calls each queued plugin's `cull` hook and drops the runtime's handle.
    ///
    /// Returns how many plugins were released.
    pub fn apply(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for module in pending {
            module.plugin().cull();
            debug!(plugin = %module.name(), "Plugin culled");
        }
        if count > 0 {
            debug!(count, "Cull list applied");
        }
        count
    }
}
