//! Local playback of synthesized audio clips via rodio

use std::io::Cursor;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;
use tracing::info;

use captiond_pipeline::AudioSink;

type PlaybackJob = (Vec<u8>, oneshot::Sender<Result<()>>);

/// Plays encoded clips on a dedicated thread.
///
/// The rodio output stream handle is not `Send`, so it lives on its own
/// thread and clips reach it through a channel. Each clip plays to
/// completion before its result is reported, which is what lets the queue
/// upstream serialize playback.
pub struct RodioSink {
    jobs: mpsc::Sender<PlaybackJob>,
}

impl RodioSink {
    pub fn new() -> Result<Self> {
        let (jobs, job_rx) = mpsc::channel::<PlaybackJob>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("captiond-playback".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("No audio output device: {}", e)));
                        return;
                    }
                };

                while let Ok((clip, done)) = job_rx.recv() {
                    let _ = done.send(play_clip_blocking(&handle, clip));
                }
            })
            .context("Failed to spawn playback thread")?;

        ready_rx
            .recv()
            .context("Playback thread exited during startup")??;

        info!("Audio output ready");
        Ok(Self { jobs })
    }
}

fn play_clip_blocking(handle: &OutputStreamHandle, clip: Vec<u8>) -> Result<()> {
    let sink = Sink::try_new(handle).context("Failed to open playback sink")?;
    let source = Decoder::new(Cursor::new(clip)).context("Undecodable audio clip")?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play_clip(&self, clip: Vec<u8>) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.jobs
            .send((clip, done_tx))
            .map_err(|_| anyhow!("Playback thread stopped"))?;
        done_rx
            .await
            .context("Playback thread dropped the clip")?
    }
}
