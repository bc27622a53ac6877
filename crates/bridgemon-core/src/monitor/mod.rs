//! Bridge peer monitoring sessions
//!
//! A session watches one channel. Its [`SessionRecord`] lives inside a
//! [`SessionHandle`] attached to the channel as a datastore, and a
//! [`BridgeHook`] registered with the bridge event source feeds every join
//! notification through the [`PeerJoinResolver`]. The [`SessionManager`]
//! wires these together on start and takes them apart on stop.
//!
//! Lock order is handle, then record, then channel. The join path takes all
//! three; stop takes handle and record, releases them, and only then touches
//! the channel's datastore list.

pub mod handle;
pub mod hook;
pub mod manager;
pub mod record;
pub mod resolver;

pub use handle::{HookRegistration, SessionHandle, DATASTORE_TYPE};
pub use hook::BridgeHook;
pub use manager::SessionManager;
pub use record::SessionRecord;
pub use resolver::{JoinCase, PeerJoinResolver, Resolution};

/// Diagnostic channel variables. None of these are contractual; they are
/// only written when diagnostics are enabled.
pub mod vars {
    pub const MONITORING_STARTED: &str = "BRIDGEMON_MONITORING_STARTED";
    pub const HOOK_ADDED: &str = "BRIDGEMON_HOOK_ADDED";
    pub const HOOK_TRIGGERED: &str = "BRIDGEMON_HOOK_TRIGGERED";
    pub const PEER_FOUND: &str = "BRIDGEMON_PEER_FOUND";
    pub const PEER_NAME: &str = "BRIDGEMON_PEER_NAME";
    pub const CHANNEL_ID: &str = "BRIDGEMON_CHANNEL_ID";
    pub const APP_CALLED: &str = "BRIDGEMON_APP_CALLED";
    pub const SOURCE_CHANNEL_ID: &str = "BRIDGEMON_SOURCE_CHANNEL_ID";
}
