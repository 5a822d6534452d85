//! Unix socket IPC server for toggle commands

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::Daemon;

/// IPC command
#[derive(Debug, PartialEq, Eq)]
pub enum IpcCommand {
    Toggle,
    Status,
    Quit,
}

impl IpcCommand {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "toggle" => Ok(Self::Toggle),
            "status" => Ok(Self::Status),
            "quit" | "exit" | "shutdown" => Ok(Self::Quit),
            _ => anyhow::bail!("Unknown command: {}", s.trim()),
        }
    }
}

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    daemon: Arc<Daemon>,
    quit: Arc<Notify>,
}

impl IpcServer {
    pub fn new(socket_path: &str, daemon: Arc<Daemon>) -> Result<Self> {
        // Remove existing socket if it exists
        let _ = std::fs::remove_file(socket_path);

        let listener = UnixListener::bind(socket_path)
            .context("Failed to bind Unix socket")?;

        info!("IPC server listening on {}", socket_path);

        Ok(Self {
            listener,
            daemon,
            quit: Arc::new(Notify::new()),
        })
    }

    /// Accept connections until a quit command arrives.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted.context("Failed to accept connection")?;
                    let daemon = self.daemon.clone();
                    let quit = self.quit.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, daemon, quit).await {
                            warn!("IPC connection error: {}", e);
                        }
                    });
                }
                _ = self.quit.notified() => {
                    info!("Received quit command");
                    return Ok(());
                }
            }
        }
    }
}

/// Handle a single IPC connection
async fn handle_connection(
    mut stream: UnixStream,
    daemon: Arc<Daemon>,
    quit: Arc<Notify>,
) -> Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("Received IPC command: {}", request.trim());

    let command = IpcCommand::parse(&request);
    let response = match &command {
        Ok(IpcCommand::Toggle) => match daemon.toggle().await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {:#}", e),
        },
        Ok(IpcCommand::Status) => daemon.status().await,
        Ok(IpcCommand::Quit) => "Shutting down".to_string(),
        Err(e) => format!("Error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    // The reply must reach the client before the accept loop is told to
    // stop.
    if matches!(command, Ok(IpcCommand::Quit)) {
        quit.notify_one();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(IpcCommand::parse("toggle\n").unwrap(), IpcCommand::Toggle);
        assert_eq!(IpcCommand::parse("STATUS").unwrap(), IpcCommand::Status);
        assert_eq!(IpcCommand::parse("shutdown").unwrap(), IpcCommand::Quit);
        assert_eq!(IpcCommand::parse("exit").unwrap(), IpcCommand::Quit);
        assert!(IpcCommand::parse("restart").is_err());
    }

    #[tokio::test]
    async fn quit_reply_reaches_the_client_before_shutdown() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("captiond.sock");
        let socket_path = socket.to_string_lossy().into_owned();

        let mut config = DaemonConfig::load_from(dir.path().join("config.toml")).unwrap();
        config.socket_path = socket_path.clone();

        let daemon = Arc::new(Daemon::new(config));
        let mut server = IpcServer::new(&socket_path, daemon).unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        stream.write_all(b"quit").await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "Shutting down");

        tokio::time::timeout(Duration::from_secs(2), server_task)
            .await
            .expect("accept loop did not stop")
            .unwrap()
            .unwrap();
    }
}
