//! Event system for the plugin runtime.
//!
//! This module provides the hook-point vocabulary shared by the host and its
//! plugins:
//!
//! - [`EventKind`] - The closed set of hook points in the host pipeline
//! - [`Event`] - Base trait for the payloads dispatched at those hook points
//! - [`ModResult`] - Verdict returned by subscribers of decision hooks
//! - [`LoadModule`] / [`UnloadModule`] - Lifecycle notifications emitted by
//!   the runtime itself
//!
//! Payloads are type-erased as `&dyn Event` and downcast by subscribers:
//!
//! ```rust,ignore
//! fn on_event(&self, ctx: &mut PluginContext<'_>, event: &dyn Event) -> ModResult {
//!     if let Some(unload) = event.downcast_ref::<UnloadModule>() {
//!         self.forget_provider_of(&unload.name);
//!     }
//!     ModResult::Passthru
//! }
//! ```

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Event Kinds
// ============================================================================

macro_rules! event_kinds {
    ($($(#[$doc:meta])* $variant:ident => $label:literal,)+) => {
        /// One hook point in the host's processing pipeline.
        ///
        /// Plugins attach to the kinds they implement; dispatch only reaches
        /// declared implementers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum EventKind {
            $($(#[$doc])* $variant,)+
        }

        impl EventKind {
            /// Every hook point, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)+];

            /// Number of distinct hook points.
            pub const COUNT: usize = Self::ALL.len();

            /// Returns the stable label used in logs.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $label,)+
                }
            }
        }
    };
}

event_kinds! {
    /// A local user finished registration.
    UserConnect => "user_connect",
    /// A user quit the network.
    UserQuit => "user_quit",
    /// A local user's connection is being torn down.
    UserDisconnect => "user_disconnect",
    /// A user joined a channel.
    UserJoin => "user_join",
    /// Sent after all join processing finished.
    PostJoin => "post_join",
    /// A user left a channel.
    UserPart => "user_part",
    /// Configuration is being reloaded.
    Rehash => "rehash",
    /// Decide whether a local user may join a channel.
    UserPreJoin => "user_pre_join",
    /// A mode change was applied.
    Mode => "mode",
    /// A user gained operator status.
    Oper => "oper",
    /// Sent after operator status was granted.
    PostOper => "post_oper",
    /// Server information is being listed.
    Info => "info",
    /// A WHOIS reply is being built.
    Whois => "whois",
    /// Decide whether an invite may be sent.
    UserPreInvite => "user_pre_invite",
    /// Decide whether a message may be delivered.
    UserPreMessage => "user_pre_message",
    /// Decide whether a nick change may proceed.
    UserPreNick => "user_pre_nick",
    /// A nick change completed.
    UserPostNick => "user_post_nick",
    /// Decide whether a mode change may proceed.
    PreMode => "pre_mode",
    /// The capability advertisement is being built.
    Isupport => "isupport",
    /// Decide whether a kill may proceed.
    Kill => "kill",
    /// A plugin was loaded.
    LoadModule => "load_module",
    /// A plugin is about to be unloaded.
    UnloadModule => "unload_module",
    /// Periodic timer tick.
    BackgroundTimer => "background_timer",
    /// Decide whether a command may run.
    PreCommand => "pre_command",
    /// A command finished running.
    PostCommand => "post_command",
    /// A local user object was created.
    UserInit => "user_init",
    /// Decide whether a registering user is ready.
    CheckReady => "check_ready",
    /// Decide whether a user may register.
    UserRegister => "user_register",
    /// Decide whether a kick may proceed.
    UserPreKick => "user_pre_kick",
    /// A kick completed.
    UserKick => "user_kick",
    /// Decide whether a single raw mode may be applied.
    RawMode => "raw_mode",
    /// Decide whether an invite requirement is satisfied.
    CheckInvite => "check_invite",
    /// Decide whether a channel key matches.
    CheckKey => "check_key",
    /// Decide whether a channel limit is exceeded.
    CheckLimit => "check_limit",
    /// Decide whether a ban matches.
    CheckBan => "check_ban",
    /// A statistics report is being built.
    Stats => "stats",
    /// Decide whether a topic change may proceed.
    PreTopicChange => "pre_topic_change",
    /// A topic change completed.
    PostTopicChange => "post_topic_change",
    /// Decide whether an away message may be set.
    SetAway => "set_away",
    /// Decide whether a channel may be deleted.
    ChannelPreDelete => "channel_pre_delete",
    /// A channel was deleted.
    ChannelDelete => "channel_delete",
    /// Decide whether a numeric reply may be sent.
    Numeric => "numeric",
    /// Idle-time housekeeping.
    GarbageCollect => "garbage_collect",
    /// Inter-plugin broadcast.
    Broadcast => "broadcast",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Verdicts
// ============================================================================

/// Verdict returned by a subscriber.
///
/// Notification hooks ignore it. Decision hooks stop at the first subscriber
/// that returns something other than [`ModResult::Passthru`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModResult {
    /// No opinion; let the next subscriber or the default behaviour decide.
    #[default]
    Passthru,
    /// Force the action to proceed.
    Allow,
    /// Force the action to be refused.
    Deny,
}

impl ModResult {
    /// Returns `true` for [`ModResult::Allow`] and [`ModResult::Deny`].
    pub fn is_decided(self) -> bool {
        self != ModResult::Passthru
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for every payload dispatched through the hook table.
///
/// Events are passed as `&dyn Event` and downcast to concrete types with
/// [`downcast_ref`](trait.Event.html#method.downcast_ref).
pub trait Event: Any + Send + Sync {
    /// Returns the hook point this payload belongs to.
    fn kind(&self) -> EventKind;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Event {
    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref()
    }

    /// Returns `true` if the payload is of type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("kind", &self.kind()).finish()
    }
}

// ============================================================================
// Lifecycle Notifications
// ============================================================================

/// Emitted after a plugin finished initialising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadModule {
    /// Name of the plugin that was loaded.
    pub name: String,
}

impl Event for LoadModule {
    fn kind(&self) -> EventKind {
        EventKind::LoadModule
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Emitted while a plugin is still registered, right before it is unloaded.
///
/// Subscribers must release anything they hold that belongs to the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadModule {
    /// Name of the plugin being unloaded.
    pub name: String,
}

impl Event for UnloadModule {
    fn kind(&self) -> EventKind {
        EventKind::UnloadModule
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
