//! Host model
//!
//! The monitor only talks to its host through the traits in this module:
//! an [`EndpointDirectory`] to find channels, a [`BridgeEventSource`] that
//! delivers join notifications, and the per-channel [`VariableStore`].
//! [`Host`] is the in-memory implementation used by the console binary and
//! the tests.

pub mod bridge;
pub mod channel;
pub mod registry;

use std::sync::Arc;

use crate::errors::Result;

pub use bridge::{Bridge, JoinNotification};
pub use channel::{AttachError, Channel, Datastore};
pub use registry::Host;

/// Token identifying one registered join hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookToken(pub u64);

impl std::fmt::Display for HookToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hook-{}", self.0)
    }
}

/// Callback invoked for every join into a bridge the hooked channel is part of.
///
/// Runs on whatever thread performed the join. Implementations must not
/// panic and must not call back into the event source.
pub trait JoinHook: Send + Sync {
    fn on_join(&self, notification: &JoinNotification);
}

/// Lookup of live channels
pub trait EndpointDirectory: Send + Sync {
    /// Exact match on channel name (case-insensitive) or unique id
    fn find_by_name(&self, name: &str) -> Option<Arc<Channel>>;

    /// First channel whose name starts with `prefix` (case-insensitive)
    fn find_by_prefix(&self, prefix: &str) -> Option<Arc<Channel>>;
}

/// Source of bridge join notifications
pub trait BridgeEventSource: Send + Sync {
    /// Register `hook` for joins into any bridge `channel` participates in,
    /// including the channel's own joins.
    fn register_join_hook(&self, channel: &Arc<Channel>, hook: Arc<dyn JoinHook>) -> Result<HookToken>;

    /// Remove a hook. Returns false if the token was unknown.
    fn unregister_join_hook(&self, token: HookToken) -> bool;
}

/// Per-channel key/value variables
pub trait VariableStore {
    fn set_variable(&self, key: &str, value: &str);

    /// Set several variables under a single lock acquisition
    fn set_variables(&self, pairs: &[(&str, &str)]);

    fn variable(&self, key: &str) -> Option<String>;
}
