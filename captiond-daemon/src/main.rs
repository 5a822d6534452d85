//! captiond binary entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use captiond_audio::CaptureSession;
use captiond_daemon::config::DaemonConfig;
use captiond_daemon::ipc::IpcServer;
use captiond_daemon::Daemon;

#[derive(Parser)]
#[command(name = "captiond", about = "Live speech captioning daemon", version)]
struct Args {
    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in CaptureSession::list_devices()? {
            println!(
                "{}: {}{} ({} ch, {} Hz)",
                device.index,
                device.name,
                if device.is_default { " [default]" } else { "" },
                device.max_input_channels,
                device.default_sample_rate
            );
        }
        return Ok(());
    }

    info!("Starting captiond v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config.config_path.display());

    let socket_path = config.socket_path.clone();
    let daemon = Arc::new(Daemon::new(config));
    daemon.init_playback().await;

    let mut ipc_server =
        IpcServer::new(&socket_path, daemon.clone()).context("Failed to start IPC server")?;

    // Auto-stop sessions whose recognizer channel died.
    let watcher = daemon.clone();
    tokio::spawn(async move {
        loop {
            watcher.reap_faulted().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    info!(
        "captiond ready, send 'toggle' on {} to start captioning",
        socket_path
    );

    tokio::select! {
        result = ipc_server.run() => {
            if let Err(e) = result {
                error!("IPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    daemon.shutdown().await;
    info!("captiond stopped");

    Ok(())
}
