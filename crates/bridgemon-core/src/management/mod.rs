//! Management surface
//!
//! Everything an operator or a dialplan can do to a monitoring session goes
//! through [`MonitorService`]:
//!
//! - [`app`]: the `BridgeMon` and `StopBridgeMon` dialplan applications
//! - [`cli`]: the `bridgemon {start|stop}` console command
//! - [`ami`]: `Key: Value` manager actions and their responses

pub mod ami;
pub mod app;
pub mod cli;

use std::sync::Arc;

use crate::config::BridgeMonConfig;
use crate::host::{BridgeEventSource, EndpointDirectory, Host};
use crate::monitor::SessionManager;

pub use ami::{ManagerMessage, ManagerResponse, ResponseKind};
pub use cli::{CliOutput, CLI_USAGE};

/// Channel lookup plus the session manager, shared by every entry point
pub struct MonitorService {
    directory: Arc<dyn EndpointDirectory>,
    sessions: SessionManager,
    diagnostics: bool,
}

impl MonitorService {
    pub fn new(
        directory: Arc<dyn EndpointDirectory>,
        events: Arc<dyn BridgeEventSource>,
        config: &BridgeMonConfig,
    ) -> Self {
        Self {
            directory,
            sessions: SessionManager::new(events, config),
            diagnostics: config.diagnostics,
        }
    }

    /// Service backed by the in-memory host for both lookup and events
    pub fn for_host(host: &Arc<Host>, config: &BridgeMonConfig) -> Self {
        Self::new(host.clone(), host.clone(), config)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
