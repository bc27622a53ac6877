//! # BridgeMon-Core
//!
//! Bridge peer monitoring for telephony channels.
//!
//! A monitoring session watches one channel. When that channel ends up in a
//! two-party bridge, the session records the other party's unique id on the
//! monitored channel under `BRIDGEPEERID` (configurable), no matter which of
//! the two joined first.
//!
//! This crate provides:
//! - The session lifecycle ([`SessionManager`]) and the peer-join resolver
//! - Host traits the monitor is written against, plus an in-memory [`Host`]
//! - Management entry points: dialplan applications, the `bridgemon` CLI
//!   command and manager actions
//! - Configuration and logging setup

pub mod config;
pub mod errors;
pub mod host;
pub mod logging;
pub mod management;
pub mod monitor;

pub use config::BridgeMonConfig;
pub use errors::{BridgeMonError, Result};
pub use host::{
    BridgeEventSource, Channel, EndpointDirectory, Host, JoinHook, JoinNotification, VariableStore,
};
pub use logging::{setup_logging, LoggingConfig};
pub use management::MonitorService;
pub use monitor::{PeerJoinResolver, Resolution, SessionManager};
