//! TCP manager listener
//!
//! Each connection gets a banner line, then any number of `Key: Value`
//! blocks terminated by an empty line. Every block is answered with one
//! response block. `Action: Logoff` ends the session. A block larger than
//! [`MAX_BLOCK_BYTES`] is answered with an error and the connection closed.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bridgemon_core::management::{ManagerMessage, ManagerResponse, ResponseKind};
use bridgemon_core::MonitorService;

pub const BANNER: &str = "BridgeMon Manager/1.0\r\n";

/// Largest request block accepted, terminating empty line excluded
pub const MAX_BLOCK_BYTES: usize = 8192;

pub struct ManagerServer {
    listener: TcpListener,
    service: Arc<MonitorService>,
}

impl ManagerServer {
    pub async fn bind(addr: SocketAddr, service: Arc<MonitorService>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind manager listener on {}", addr))?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is aborted
    pub async fn run(self) {
        info!("Manager listening on {}", self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default());
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, service).await {
                            warn!("Manager connection {} failed: {:#}", peer, e);
                        }
                        debug!("Manager connection {} closed", peer);
                    });
                }
                Err(e) => warn!("Manager accept failed: {}", e),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn serve_connection(stream: TcpStream, service: Arc<MonitorService>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(BANNER.as_bytes()).await?;

    let mut block = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        // One byte over the budget marks an oversized block
        let budget = (MAX_BLOCK_BYTES.saturating_sub(block.len()) + 1) as u64;
        if (&mut reader).take(budget).read_line(&mut line).await? == 0 {
            break;
        }
        if !line.trim().is_empty() {
            if block.len() + line.len() > MAX_BLOCK_BYTES {
                warn!("Manager request exceeds {} bytes", MAX_BLOCK_BYTES);
                let response = ManagerResponse::error(&ManagerMessage::default(), "Message too large");
                writer.write_all(response.to_wire().as_bytes()).await?;
                break;
            }
            block.push_str(line.trim_end_matches(['\r', '\n']));
            block.push('\n');
            continue;
        }
        if block.is_empty() {
            continue;
        }

        let request = ManagerMessage::parse(&std::mem::take(&mut block));
        let response = dispatch(&service, request).await?;
        writer.write_all(response.to_wire().as_bytes()).await?;
        if response.kind == ResponseKind::Goodbye {
            break;
        }
    }
    writer.shutdown().await?;
    Ok(())
}

/// Stop can wait on a concurrent teardown, so actions run off the reactor
async fn dispatch(service: &Arc<MonitorService>, request: ManagerMessage) -> Result<ManagerResponse> {
    let service = Arc::clone(service);
    let response = tokio::task::spawn_blocking(move || service.handle_action(&request))
        .await
        .context("manager action panicked")?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgemon_core::{BridgeMonConfig, Host};
    use tokio::io::AsyncReadExt;

    async fn start() -> Result<(Arc<Host>, SocketAddr, JoinHandle<()>)> {
        let host = Arc::new(Host::new());
        let service = Arc::new(MonitorService::for_host(&host, &BridgeMonConfig::default()));
        let server = ManagerServer::bind("127.0.0.1:0".parse()?, service).await?;
        let addr = server.local_addr()?;
        Ok((host, addr, server.spawn()))
    }

    async fn read_block(lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>) -> Result<Vec<String>> {
        let mut block = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                break;
            }
            block.push(line);
        }
        Ok(block)
    }

    #[tokio::test]
    async fn test_start_stop_over_tcp() -> Result<()> {
        let (host, addr, server) = start().await?;
        let alice = host.create_channel("PJSIP/alice-1")?;

        let (reader, mut writer) = TcpStream::connect(addr).await?.into_split();
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(lines.next_line().await?.as_deref(), Some("BridgeMon Manager/1.0"));

        writer
            .write_all(b"Action: BridgeMon\r\nChannel: PJSIP/alice-1\r\nActionID: 7\r\n\r\n")
            .await?;
        assert_eq!(read_block(&mut lines).await?, vec!["Response: Success", "ActionID: 7"]);

        writer
            .write_all(b"Action: BridgeMon\r\nChannel: PJSIP/nobody\r\n\r\n")
            .await?;
        assert_eq!(
            read_block(&mut lines).await?,
            vec!["Response: Error", "Message: No such channel"]
        );

        writer
            .write_all(b"Action: StopBridgeMon\r\nChannel: PJSIP/alice-1\r\n\r\n")
            .await?;
        assert_eq!(read_block(&mut lines).await?, vec!["Response: Success"]);
        assert!(alice.datastore_uids("bridgemon").is_empty());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_logoff_closes_connection() -> Result<()> {
        let (_host, addr, server) = start().await?;

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(b"Action: Logoff\r\n\r\n").await?;

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;
        assert_eq!(
            reply,
            format!("{}Response: Goodbye\r\nMessage: Thanks for all the fish.\r\n\r\n", BANNER)
        );

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_block_closes_connection() -> Result<()> {
        let (_host, addr, server) = start().await?;

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&vec![b'A'; MAX_BLOCK_BYTES + 1]).await?;

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;
        assert_eq!(reply, format!("{}Response: Error\r\nMessage: Message too large\r\n\r\n", BANNER));

        server.abort();
        Ok(())
    }
}
