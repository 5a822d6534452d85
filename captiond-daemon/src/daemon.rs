//! Daemon state: configuration, shared display, playback queue, and the
//! active captioning session

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use captiond_pipeline::{shared_display, AudioPlaybackQueue, SharedDisplay};

use crate::config::DaemonConfig;
use crate::session::RecordingSession;
use crate::sink::RodioSink;

pub struct Daemon {
    config: DaemonConfig,
    display: SharedDisplay,
    playback: AudioPlaybackQueue,
    session: Mutex<Option<RecordingSession>>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            display: shared_display(),
            playback: AudioPlaybackQueue::new(),
            session: Mutex::new(None),
        }
    }

    /// Attach the local audio output when configured. A missing output
    /// device disables playback but never captioning.
    pub async fn init_playback(&self) {
        if !self.config.auto_play_audio {
            return;
        }
        match RodioSink::new() {
            Ok(sink) => self.playback.initialize(Arc::new(sink)).await,
            Err(e) => warn!("Audio playback disabled: {}", e),
        }
    }

    /// Start captioning when idle, stop it when active.
    pub async fn toggle(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(active) => {
                info!("Stopping captioning");
                active.stop().await?;
                Ok("Captioning stopped".to_string())
            }
            None => {
                info!("Starting captioning");
                let started =
                    RecordingSession::start(&self.config, self.display.clone(), &self.playback)
                        .await?;
                *session = Some(started);
                Ok("Captioning started".to_string())
            }
        }
    }

    pub async fn status(&self) -> String {
        let session = self.session.lock().await;
        if session.is_none() {
            return "idle".to_string();
        }

        let display = self.display.read().await;
        let delivered = display
            .translations
            .iter()
            .filter(|t| t.success == Some(true))
            .count();
        format!(
            "captioning ({}, {} utterance(s), {} caption(s) delivered)",
            if display.listening {
                "listening"
            } else {
                "not listening"
            },
            display.input_lines.len(),
            delivered
        )
    }

    /// Tear down a session whose recognizer channel died.
    pub async fn reap_faulted(&self) {
        let mut session = self.session.lock().await;
        let faulted = session.as_ref().map_or(false, RecordingSession::is_faulted);
        if faulted {
            warn!("Recognizer channel faulted, stopping session");
            if let Some(active) = session.take() {
                if let Err(e) = active.stop().await {
                    warn!("Session teardown failed: {}", e);
                }
            }
        }
    }

    /// Stop the active session, if any.
    pub async fn shutdown(&self) {
        if let Some(active) = self.session.lock().await.take() {
            if let Err(e) = active.stop().await {
                warn!("Session teardown failed: {}", e);
            }
        }
    }
}
