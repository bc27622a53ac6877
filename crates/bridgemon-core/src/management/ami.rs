//! Manager actions
//!
//! Messages are blocks of `Key: Value` lines terminated by an empty line.
//! Header names are matched case-insensitively. Two actions are served:
//!
//! - `BridgeMon`: `Channel` (required, exact name), `ChannelID` (optional)
//! - `StopBridgeMon`: same headers
//!
//! `ActionID` is echoed back on every response.

use std::fmt::Write as _;

use tracing::{debug, warn};

use super::MonitorService;

pub const ACTION_START: &str = "BridgeMon";
pub const ACTION_STOP: &str = "StopBridgeMon";
pub const ACTION_LOGOFF: &str = "Logoff";

/// One parsed manager message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerMessage {
    headers: Vec<(String, String)>,
}

impl ManagerMessage {
    /// Parse a block of `Key: Value` lines. Lines without a colon are skipped.
    pub fn parse(block: &str) -> Self {
        let headers = block
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { headers }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// First value for `key`, empty values reading as absent
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn action(&self) -> Option<&str> {
        self.header("Action")
    }

    pub fn action_id(&self) -> Option<&str> {
        self.header("ActionID")
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Success,
    Error,
    Goodbye,
}

impl ResponseKind {
    fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Success => "Success",
            ResponseKind::Error => "Error",
            ResponseKind::Goodbye => "Goodbye",
        }
    }
}

/// Response to one manager message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerResponse {
    pub kind: ResponseKind,
    pub action_id: Option<String>,
    pub message: Option<String>,
}

impl ManagerResponse {
    pub fn success(request: &ManagerMessage) -> Self {
        Self {
            kind: ResponseKind::Success,
            action_id: request.action_id().map(str::to_string),
            message: None,
        }
    }

    pub fn error(request: &ManagerMessage, message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            action_id: request.action_id().map(str::to_string),
            message: Some(message.into()),
        }
    }

    pub fn goodbye(request: &ManagerMessage) -> Self {
        Self {
            kind: ResponseKind::Goodbye,
            action_id: request.action_id().map(str::to_string),
            message: Some("Thanks for all the fish.".to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResponseKind::Success
    }

    /// Wire form, CRLF line endings, terminated by an empty line
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "Response: {}\r\n", self.kind.as_str());
        if let Some(id) = &self.action_id {
            let _ = write!(out, "ActionID: {}\r\n", id);
        }
        if let Some(message) = &self.message {
            let _ = write!(out, "Message: {}\r\n", message);
        }
        out.push_str("\r\n");
        out
    }
}

impl MonitorService {
    /// Dispatch one manager message
    pub fn handle_action(&self, request: &ManagerMessage) -> ManagerResponse {
        let Some(action) = request.action() else {
            return ManagerResponse::error(request, "Missing action in request");
        };
        debug!("Manager action {}", action);

        if action.eq_ignore_ascii_case(ACTION_START) {
            self.manager_session_action(request, true)
        } else if action.eq_ignore_ascii_case(ACTION_STOP) {
            self.manager_session_action(request, false)
        } else if action.eq_ignore_ascii_case(ACTION_LOGOFF) {
            ManagerResponse::goodbye(request)
        } else {
            ManagerResponse::error(request, "Invalid/unknown command")
        }
    }

    fn manager_session_action(&self, request: &ManagerMessage, start: bool) -> ManagerResponse {
        let Some(name) = request.header("Channel") else {
            return ManagerResponse::error(request, "No channel specified");
        };
        let Some(channel) = self.directory.find_by_name(name) else {
            return ManagerResponse::error(request, "No such channel");
        };
        let session_id = request.header("ChannelID");

        let result = if start {
            self.sessions.start(&channel, session_id)
        } else {
            self.sessions.stop(&channel, session_id)
        };

        match result {
            Ok(()) => ManagerResponse::success(request),
            Err(e) => {
                warn!("Manager action on {} failed: {}", channel.name(), e);
                let message = if start {
                    "Could not start bridge monitoring"
                } else {
                    "Could not stop bridge monitoring"
                };
                ManagerResponse::error(request, message)
            }
        }
    }
}
