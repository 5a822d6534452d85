//! One captioning session, owned end to end
//!
//! A session ties together the microphone capture, the recognizer channel,
//! and the translation pipeline, and tears them down as a unit. Stopping is
//! graceful: capture flushes its final partial frame, buffered frames drain
//! to the recognizer, the channel sends its end-of-stream control message,
//! and the caption packager finishes whatever translations are in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use captiond_audio::{CaptureSession, FrameSink};
use captiond_pipeline::{
    caption_slot_channel, AudioPlaybackQueue, CaptionPackager, DurationSplitter, SequenceStore,
    ServiceClient, ServiceEndpoints, SharedDisplay, SpeechSynthesizer, TranscriptRouter,
    TranslationOptions, TranslationPipeline,
};
use captiond_transport::{ChannelEvent, TransportChannel};

use crate::config::DaemonConfig;

pub struct RecordingSession {
    capture: CaptureSession,
    channel: TransportChannel,
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
    packager: JoinHandle<()>,
    fault: Arc<AtomicBool>,
}

impl RecordingSession {
    pub async fn start(
        config: &DaemonConfig,
        display: SharedDisplay,
        playback: &AudioPlaybackQueue,
    ) -> Result<Self> {
        let (channel, mut events) = TransportChannel::connect(&config.recognizer_url)
            .await
            .context("Failed to connect to recognizer")?;

        // Synthesized clips from the previous session must not bleed into
        // this one.
        playback.clear_queue().await;
        let playback_session = if config.auto_play_audio {
            Some(playback.begin_session().await)
        } else {
            None
        };

        let client = Arc::new(ServiceClient::new(ServiceEndpoints {
            translation_url: config.translation_url.clone(),
            synthesis_url: config.synthesis_url.clone(),
            caption_url: config.caption_url.clone(),
            caption_region: config.caption_region.clone(),
        })?);

        let counter_path = config
            .counter_path
            .clone()
            .unwrap_or_else(SequenceStore::default_path);
        let store = SequenceStore::open(&counter_path).with_context(|| {
            format!("Failed to open counter store at {}", counter_path.display())
        })?;

        let (slot_tx, slot_rx) = caption_slot_channel();
        let packager = CaptionPackager::new(
            client.clone(),
            Arc::new(DurationSplitter::default()),
            config.stream_key.clone(),
            config.caption_offset_secs,
            display.clone(),
        )
        .spawn(slot_rx);

        let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = if playback_session.is_some() {
            Some(client.clone())
        } else {
            None
        };

        let pipeline = TranslationPipeline::new(
            client,
            synthesizer,
            TranslationOptions {
                model: config.translation_model.clone(),
                source_language: config.source_language.clone(),
                target_language: config.target_language.clone(),
                voice: config.voice.clone(),
            },
            playback_session,
            display.clone(),
            slot_tx,
        );

        let mut router =
            TranscriptRouter::new(pipeline, display.clone(), store, config.stream_key.clone());

        let fault = Arc::new(AtomicBool::new(false));

        // Inbound: recognizer events drive the router until the channel ends.
        let inbound = tokio::spawn({
            let fault = fault.clone();
            let display = display.clone();
            async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ChannelEvent::Open => router.set_listening(true).await,
                        ChannelEvent::Message(raw) => router.handle_message(&raw).await,
                        ChannelEvent::Error(e) => {
                            warn!("Recognizer channel fault: {}", e);
                            fault.store(true, Ordering::SeqCst);
                            break;
                        }
                        ChannelEvent::Closed => break,
                    }
                }
                display.write().await.listening = false;
                debug!("Inbound event loop stopped");
            }
        });

        // Outbound: PCM frames from the capture callback, forwarded in order.
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<i16>>();
        let sink: FrameSink = Arc::new(move |frame| {
            let _ = frame_tx.send(frame);
        });

        let mut capture = CaptureSession::new(config.capture.clone(), sink);
        if let Err(e) = capture.start() {
            // Unwind the half-started session: closing the channel ends the
            // reader, which drops the router and lets the packager drain.
            if let Err(close_err) = channel.close().await {
                debug!("Channel close after failed start: {}", close_err);
            }
            let _ = tokio::time::timeout(Duration::from_secs(2), inbound).await;
            let _ = tokio::time::timeout(Duration::from_secs(2), packager).await;
            return Err(e).context("Failed to start audio capture");
        }

        let outbound = tokio::spawn({
            let channel = channel.clone();
            let fault = fault.clone();
            let markers = config.send_timestamp_markers;
            async move {
                while let Some(frame) = frame_rx.recv().await {
                    if markers {
                        if let Err(e) = channel.send_timestamp_marker().await {
                            warn!("Failed to send timestamp marker: {}", e);
                            fault.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    if let Err(e) = channel.send_frame(&frame).await {
                        warn!("Failed to stream audio frame: {}", e);
                        fault.store(true, Ordering::SeqCst);
                        break;
                    }
                }
                debug!("Outbound frame loop stopped");
            }
        });

        info!("Captioning session started");
        Ok(Self {
            capture,
            channel,
            outbound,
            inbound,
            packager,
            fault,
        })
    }

    /// The recognizer channel died; the session should be torn down.
    pub fn is_faulted(&self) -> bool {
        self.fault.load(Ordering::SeqCst)
    }

    /// Graceful teardown. Flushes capture, drains buffered frames, closes
    /// the channel, and lets in-flight translations finish captioning.
    pub async fn stop(mut self) -> Result<()> {
        self.capture.stop();
        // Dropping the capture session releases the frame sink, which ends
        // the outbound loop once buffered frames are sent.
        drop(self.capture);
        let _ = tokio::time::timeout(Duration::from_secs(2), self.outbound).await;

        self.channel
            .close()
            .await
            .context("Failed to close recognizer channel")?;
        let _ = tokio::time::timeout(Duration::from_secs(2), self.inbound).await;

        // The router went down with the inbound loop, closing the slot
        // queue; the packager drains what remains.
        let _ = tokio::time::timeout(Duration::from_secs(10), self.packager).await;

        info!("Captioning session stopped");
        Ok(())
    }
}
