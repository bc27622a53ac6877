//! Interactive console
//!
//! Accepts the `bridgemon start|stop` command plus a handful of commands that
//! drive the in-memory host, so bridges can be formed and torn down by hand.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use bridgemon_core::host::{Channel, EndpointDirectory, Host, VariableStore};
use bridgemon_core::MonitorService;

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
enum ConsoleCommand {
    /// bridgemon {start|stop} <channel_name> [channel_id]
    #[command(disable_help_flag = true)]
    Bridgemon {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Channel management
    #[command(subcommand)]
    Channel(ChannelCommand),
    /// Bridge management
    #[command(subcommand)]
    Bridge(BridgeCommand),
    /// Run a dialplan application on a channel
    App {
        name: String,
        channel: String,
        #[arg(default_value = "")]
        data: String,
    },
    /// Hang up a channel
    Hangup { channel: String },
    /// Show a channel's variables
    Vars { channel: String },
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// Create a channel
    New { name: String },
    /// List live channels
    List,
}

#[derive(Subcommand, Debug)]
enum BridgeCommand {
    /// Create a bridge, optionally with a fixed id
    New { id: Option<String> },
    /// Put a channel into a bridge
    Join { bridge: String, channel: String },
    /// Take a channel out of its bridge
    Leave { channel: String },
    /// Destroy a bridge
    Destroy { bridge: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Quit,
}

pub struct Console {
    host: Arc<Host>,
    service: Arc<MonitorService>,
}

impl Console {
    pub fn new(host: Arc<Host>, service: Arc<MonitorService>) -> Self {
        Self { host, service }
    }

    /// Execute one console line
    pub fn execute(&self, line: &str) -> Reply {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Reply::Output(String::new());
        }

        let parsed = match ConsoleLine::try_parse_from(words.iter().copied()) {
            Ok(parsed) => parsed,
            Err(e) => return Reply::Output(e.to_string()),
        };

        let output = match parsed.command {
            ConsoleCommand::Bridgemon { args } => {
                let mut argv = vec!["bridgemon"];
                argv.extend(args.iter().map(String::as_str));
                self.service.cli_command(&argv).render().to_string()
            }
            ConsoleCommand::Channel(command) => self.channel(command),
            ConsoleCommand::Bridge(command) => self.bridge(command),
            ConsoleCommand::App { name, channel, data } => match self.lookup(&channel) {
                Ok(channel) => match self.service.exec_app(&name, &channel, &data) {
                    Ok(()) => format!("{} completed on {}\n", name, channel.name()),
                    Err(e) => format!("{} failed: {}\n", name, e),
                },
                Err(message) => message,
            },
            ConsoleCommand::Hangup { channel } => match self.lookup(&channel) {
                Ok(channel) => {
                    self.host.hangup(&channel);
                    format!("Hung up {}\n", channel.name())
                }
                Err(message) => message,
            },
            ConsoleCommand::Vars { channel } => match self.lookup(&channel) {
                Ok(channel) => {
                    let mut vars: Vec<_> = channel.variables().into_iter().collect();
                    vars.sort();
                    vars.iter().map(|(k, v)| format!("{}={}\n", k, v)).collect()
                }
                Err(message) => message,
            },
            ConsoleCommand::Quit => return Reply::Quit,
        };
        Reply::Output(output)
    }

    fn channel(&self, command: ChannelCommand) -> String {
        match command {
            ChannelCommand::New { name } => match self.host.create_channel(&name) {
                Ok(channel) => format!("Created {} ({})\n", channel.name(), channel.unique_id()),
                Err(e) => format!("{}\n", e),
            },
            ChannelCommand::List => self
                .host
                .channels()
                .iter()
                .map(|c| {
                    let bridge = self.host.bridge_of(c).unwrap_or_else(|| "-".to_string());
                    let peer = c.variable(self.service.sessions().resolver().peer_id_key());
                    format!(
                        "{:<32} {:<20} {:<44} {}\n",
                        c.name(),
                        c.unique_id(),
                        bridge,
                        peer.as_deref().unwrap_or("-")
                    )
                })
                .collect(),
        }
    }

    fn bridge(&self, command: BridgeCommand) -> String {
        match command {
            BridgeCommand::New { id: None } => format!("Created {}\n", self.host.create_bridge()),
            BridgeCommand::New { id: Some(id) } => match self.host.create_named_bridge(&id) {
                Ok(()) => format!("Created {}\n", id),
                Err(e) => format!("{}\n", e),
            },
            BridgeCommand::Join { bridge, channel } => match self.lookup(&channel) {
                Ok(channel) => match self.host.join_bridge(&bridge, &channel) {
                    Ok(()) => format!("{} joined {}\n", channel.name(), bridge),
                    Err(e) => format!("{}\n", e),
                },
                Err(message) => message,
            },
            BridgeCommand::Leave { channel } => match self.lookup(&channel) {
                Ok(channel) => {
                    if self.host.leave_bridge(&channel) {
                        format!("{} left its bridge\n", channel.name())
                    } else {
                        format!("{} is not bridged\n", channel.name())
                    }
                }
                Err(message) => message,
            },
            BridgeCommand::Destroy { bridge } => {
                if self.host.destroy_bridge(&bridge) {
                    format!("Destroyed {}\n", bridge)
                } else {
                    format!("No such bridge: {}\n", bridge)
                }
            }
        }
    }

    /// Exact name or unique id first, then name prefix
    fn lookup(&self, name: &str) -> Result<Arc<Channel>, String> {
        self.host
            .find_by_name(name)
            .or_else(|| self.host.find_by_prefix(name))
            .ok_or_else(|| format!("No channel matching '{}' found.\n", name))
    }
}
