//! Plugin version metadata.

use bitflags::bitflags;

bitflags! {
    /// Capability flags advertised by a plugin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VersionFlags: u32 {
        /// The plugin may never be unloaded.
        const STATIC    = 1 << 0;
        /// The plugin ships with the daemon.
        const VENDOR    = 1 << 1;
        /// Every linked server must run the plugin.
        const COMMON    = 1 << 2;
        /// Linked servers should run the plugin, but it is not enforced.
        const OPTCOMMON = 1 << 3;
    }
}

/// Description and flags reported by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    /// One-line description shown in listings and logs.
    pub description: String,
    /// Capability flags.
    pub flags: VersionFlags,
    /// Data compared between linked servers for [`VersionFlags::COMMON`] plugins.
    pub link_data: Option<String>,
}

impl Version {
    /// Creates a version with a description and flags.
    pub fn new(description: impl Into<String>, flags: VersionFlags) -> Self {
        Self {
            description: description.into(),
            flags,
            link_data: None,
        }
    }

    /// Attaches link compatibility data.
    pub fn with_link_data(mut self, link_data: impl Into<String>) -> Self {
        self.link_data = Some(link_data.into());
        self
    }

    /// Returns `true` when the plugin is flagged as non-unloadable.
    pub fn is_static(&self) -> bool {
        self.flags.contains(VersionFlags::STATIC)
    }
}
