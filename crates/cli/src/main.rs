//! bridgemon - bridge peer monitoring console and manager listener

mod console;
mod manager_server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use bridgemon_core::{setup_logging, BridgeMonConfig, Host, MonitorService};

use console::{Console, Reply};
use manager_server::ManagerServer;

#[derive(Parser, Debug)]
#[command(name = "bridgemon")]
#[command(version, about = "Record the bridged peer of monitored channels")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BRIDGEMON_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable the manager listener on this address
    #[arg(short, long)]
    manager: Option<String>,
}

fn load_config(args: &Args) -> Result<BridgeMonConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeMonConfig::from_file(path)?,
        None => BridgeMonConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(address) = &args.manager {
        config.manager.enabled = true;
        config.manager.bind_address = address.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args).context("Failed to load configuration")?;
    setup_logging(&config.logging_config()?)?;

    let host = Arc::new(Host::new());
    let service = Arc::new(MonitorService::for_host(&host, &config));

    let manager = if config.manager.enabled {
        let server = ManagerServer::bind(config.manager_addr()?, Arc::clone(&service)).await?;
        Some(server.spawn())
    } else {
        None
    };

    let console = Console::new(host, service);
    tokio::select! {
        result = run_console(&console) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Some(manager) = manager {
        manager.abort();
    }
    info!("bridgemon stopped");
    Ok(())
}

async fn run_console(console: &Console) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(b"bridgemon> ").await?;
    stdout.flush().await?;
    while let Some(line) = lines.next_line().await? {
        // Join hooks run inline and stop may wait on a teardown
        let reply = tokio::task::block_in_place(|| console.execute(&line));
        match reply {
            Reply::Output(text) => stdout.write_all(text.as_bytes()).await?,
            Reply::Quit => return Ok(()),
        }
        stdout.write_all(b"bridgemon> ").await?;
        stdout.flush().await?;
    }
    warn!("Console input closed");
    Ok(())
}
