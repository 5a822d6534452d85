//! Serialized playback of synthesized audio clips
//!
//! FIFO queue guaranteeing at most one clip plays at a time, decoupling
//! synthesis completion order from playback order. Clips enqueued before the
//! sink is initialized are retained and drained in order once it is.
//!
//! Enqueues go through an epoch-stamped [`PlaybackSession`] handle so
//! synthesis results that resolve after their session stopped are dropped
//! instead of playing into the next session.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Pluggable audio output
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play one clip to completion.
    async fn play_clip(&self, clip: Vec<u8>) -> anyhow::Result<()>;
}

struct QueueInner {
    queue: VecDeque<Vec<u8>>,
    is_playing: bool,
    epoch: u64,
    sink: Option<Arc<dyn AudioSink>>,
}

/// FIFO audio playback queue
#[derive(Clone)]
pub struct AudioPlaybackQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl Default for AudioPlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlaybackQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                queue: VecDeque::new(),
                is_playing: false,
                epoch: 0,
                sink: None,
            })),
        }
    }

    /// Attach the audio sink. Items queued beforehand drain in original
    /// order before anything enqueued later.
    pub async fn initialize(&self, sink: Arc<dyn AudioSink>) {
        self.inner.lock().await.sink = Some(sink);
        self.kick();
    }

    /// Start a playback session; enqueues through the returned handle are
    /// dropped once `clear_queue` has been called.
    pub async fn begin_session(&self) -> PlaybackSession {
        let epoch = self.inner.lock().await.epoch;
        PlaybackSession {
            queue: self.clone(),
            epoch,
        }
    }

    /// Drop all pending clips and invalidate outstanding session handles.
    /// A clip already in flight finishes playing.
    pub async fn clear_queue(&self) {
        let mut inner = self.inner.lock().await;
        inner.queue.clear();
        inner.epoch += 1;
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    async fn enqueue_at(&self, epoch: u64, clip: Vec<u8>) {
        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                debug!("Dropping audio clip from a stopped session");
                return;
            }
            inner.queue.push_back(clip);
        }
        self.kick();
    }

    /// Start the drain task if playback is idle. The `is_playing` flag acts
    /// as a mutex: a new clip is never started while another is in flight.
    fn kick(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                let (clip, sink) = {
                    let mut inner = queue.inner.lock().await;
                    if inner.is_playing {
                        return;
                    }
                    let Some(sink) = inner.sink.clone() else {
                        return;
                    };
                    let Some(clip) = inner.queue.pop_front() else {
                        return;
                    };
                    inner.is_playing = true;
                    (clip, sink)
                };

                if let Err(e) = sink.play_clip(clip).await {
                    // Skip the clip and keep the queue moving.
                    warn!("Audio playback failed: {}", e);
                }

                queue.inner.lock().await.is_playing = false;
            }
        });
    }
}

/// Epoch-stamped enqueue handle, one per recording session
#[derive(Clone)]
pub struct PlaybackSession {
    queue: AudioPlaybackQueue,
    epoch: u64,
}

impl PlaybackSession {
    /// Append a clip; begins playback immediately when idle.
    pub async fn enqueue(&self, clip: Vec<u8>) {
        self.queue.enqueue_at(self.epoch, clip).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Records playback order and asserts clips never overlap.
    struct FakeSink {
        played: Mutex<Vec<u8>>,
        in_flight: AtomicBool,
        fail_on: Option<u8>,
    }

    impl FakeSink {
        fn new(fail_on: Option<u8>) -> Arc<Self> {
            Arc::new(Self {
                played: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                fail_on,
            })
        }

        async fn played(&self) -> Vec<u8> {
            self.played.lock().await.clone()
        }
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        async fn play_clip(&self, clip: Vec<u8>) -> anyhow::Result<()> {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "overlapping play_clip calls"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
            let id = clip[0];
            self.played.lock().await.push(id);
            self.in_flight.store(false, Ordering::SeqCst);
            if self.fail_on == Some(id) {
                anyhow::bail!("decode failure for clip {}", id);
            }
            Ok(())
        }
    }

    async fn wait_for_played(sink: &FakeSink, count: usize) {
        for _ in 0..200 {
            if sink.played().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} played clips", count);
    }

    #[tokio::test]
    async fn plays_clips_exactly_once_in_enqueue_order() {
        let queue = AudioPlaybackQueue::new();
        let sink = FakeSink::new(None);
        queue.initialize(sink.clone()).await;

        let session = queue.begin_session().await;
        for id in 1..=5u8 {
            session.enqueue(vec![id]).await;
        }

        wait_for_played(&sink, 5).await;
        assert_eq!(sink.played().await, vec![1, 2, 3, 4, 5]);
        assert_eq!(queue.queue_len().await, 0);
    }

    #[tokio::test]
    async fn retains_clips_enqueued_before_initialization() {
        let queue = AudioPlaybackQueue::new();
        let session = queue.begin_session().await;

        session.enqueue(vec![1]).await;
        session.enqueue(vec![2]).await;
        assert_eq!(queue.queue_len().await, 2);

        let sink = FakeSink::new(None);
        queue.initialize(sink.clone()).await;
        session.enqueue(vec![3]).await;

        wait_for_played(&sink, 3).await;
        assert_eq!(sink.played().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn advances_past_playback_errors() {
        let queue = AudioPlaybackQueue::new();
        let sink = FakeSink::new(Some(1));
        queue.initialize(sink.clone()).await;

        let session = queue.begin_session().await;
        session.enqueue(vec![1]).await;
        session.enqueue(vec![2]).await;

        wait_for_played(&sink, 2).await;
        assert_eq!(sink.played().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn stale_session_clips_are_dropped_after_clear() {
        let queue = AudioPlaybackQueue::new();
        let sink = FakeSink::new(None);
        queue.initialize(sink.clone()).await;

        let old_session = queue.begin_session().await;
        queue.clear_queue().await;
        let new_session = queue.begin_session().await;

        // Late synthesis results from the stopped session.
        old_session.enqueue(vec![9]).await;
        new_session.enqueue(vec![1]).await;

        wait_for_played(&sink, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.played().await, vec![1]);
    }
}
