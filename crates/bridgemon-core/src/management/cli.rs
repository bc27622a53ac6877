//! `bridgemon {start|stop} <channel_name> [channel_id]`

use super::MonitorService;

pub const CLI_USAGE: &str = concat!(
    "Usage: bridgemon start <channel_name> [channel_id]\n",
    "         Start monitoring bridge events for a channel.\n",
    "       bridgemon stop <channel_name> [channel_id]\n",
    "         Stop monitoring bridge events for a channel.\n",
);

/// Result of a console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOutput {
    /// Malformed command line
    ShowUsage,
    Text(String),
}

impl CliOutput {
    pub fn render(&self) -> &str {
        match self {
            CliOutput::ShowUsage => CLI_USAGE,
            CliOutput::Text(text) => text,
        }
    }
}

impl MonitorService {
    /// Handle a full command line, `args[0]` being `bridgemon`.
    ///
    /// The channel is matched by name prefix. The session id defaults to the
    /// channel's unique id.
    pub fn cli_command(&self, args: &[&str]) -> CliOutput {
        if args.len() < 3 {
            return CliOutput::ShowUsage;
        }
        let (action, prefix) = (args[1], args[2]);
        let session_id = args.get(3).copied();

        let start = action.eq_ignore_ascii_case("start");
        if !start && !action.eq_ignore_ascii_case("stop") {
            return CliOutput::ShowUsage;
        }

        let Some(channel) = self.directory.find_by_prefix(prefix) else {
            return CliOutput::Text(format!("No channel matching '{}' found.\n", prefix));
        };
        let shown_id = session_id.unwrap_or(channel.unique_id()).to_string();

        let text = if start {
            match self.sessions.start(&channel, session_id) {
                Ok(()) => format!(
                    "Started monitoring bridge events for channel {} (ID: {})\n",
                    channel.name(),
                    shown_id
                ),
                Err(e) => format!("Could not start bridge monitoring on {}: {}\n", channel.name(), e),
            }
        } else {
            match self.sessions.stop(&channel, session_id) {
                Ok(()) => format!(
                    "Stopped monitoring bridge events for channel {} (ID: {})\n",
                    channel.name(),
                    shown_id
                ),
                Err(e) => format!("Could not stop bridge monitoring on {}: {}\n", channel.name(), e),
            }
        };
        CliOutput::Text(text)
    }
}
