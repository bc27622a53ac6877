//! Dialplan applications
//!
//! `BridgeMon(channel_id)` starts a session on the channel running the
//! dialplan, keyed by `channel_id`. `StopBridgeMon([channel_id])` stops it;
//! without an argument the channel's own unique id is used.

use std::sync::Arc;

use tracing::{debug, warn};

use super::MonitorService;
use crate::errors::{BridgeMonError, Result};
use crate::host::{Channel, VariableStore};
use crate::monitor::vars;

pub const START_APP: &str = "BridgeMon";
pub const STOP_APP: &str = "StopBridgeMon";

/// First comma-separated application argument, trimmed. `None` if empty.
fn first_arg(data: &str) -> Option<&str> {
    let arg = data.split(',').next().unwrap_or_default().trim();
    (!arg.is_empty()).then_some(arg)
}

impl MonitorService {
    /// `BridgeMon(channel_id)`
    pub fn exec_bridgemon(&self, channel: &Arc<Channel>, data: &str) -> Result<()> {
        debug!("{} called for channel {} with data: {:?}", START_APP, channel.name(), data);

        let Some(session_id) = first_arg(data) else {
            warn!("{} requires a channel ID argument", START_APP);
            return Err(BridgeMonError::invalid_argument(format!(
                "{} requires a channel ID argument",
                START_APP
            )));
        };

        if self.diagnostics {
            channel.set_variables(&[
                (vars::APP_CALLED, "1"),
                (vars::SOURCE_CHANNEL_ID, session_id),
            ]);
        }

        self.sessions.start(channel, Some(session_id))
    }

    /// `StopBridgeMon([channel_id])`
    pub fn exec_stop_bridgemon(&self, channel: &Arc<Channel>, data: &str) -> Result<()> {
        let result = self.sessions.stop(channel, first_arg(data));
        if let Err(e) = &result {
            warn!("{} failed on {}: {}", STOP_APP, channel.name(), e);
        }
        result
    }

    /// Run a dialplan application by name (case-insensitive)
    pub fn exec_app(&self, app: &str, channel: &Arc<Channel>, data: &str) -> Result<()> {
        if app.eq_ignore_ascii_case(START_APP) {
            self.exec_bridgemon(channel, data)
        } else if app.eq_ignore_ascii_case(STOP_APP) {
            self.exec_stop_bridgemon(channel, data)
        } else {
            Err(BridgeMonError::not_found(format!("No application '{}'", app)))
        }
    }
}
