//! Caption pacing and sequential submission
//!
//! Translated (or passthrough) text is split into caption-sized units,
//! stamped with a target broadcast timestamp, and submitted to the broadcast
//! endpoint strictly one at a time. The packager consumes per-utterance
//! completion slots in submission order, so captions reach the endpoint in
//! utterance order even when translations resolve out of order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::display::SharedDisplay;
use crate::error::Result;

/// Finalized text plus utterance timing, ready for packaging
#[derive(Debug, Clone)]
pub struct CaptionJob {
    pub seq: u64,
    pub text: String,
    pub start_ms: i64,
    pub stop_ms: i64,
}

/// One caption-sized unit of a job
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionUnit {
    pub text: String,
    /// Unit start, epoch milliseconds
    pub at_ms: i64,
}

/// A sequenced, timestamped packet bound for the broadcast endpoint
#[derive(Debug, Clone)]
pub struct CaptionPacket {
    pub seq: u64,
    pub text: String,
    pub target_timestamp: DateTime<Utc>,
    pub stream_key: String,
}

/// Broadcast captioning endpoint; returns the delivery timestamp on success.
#[async_trait]
pub trait CaptionEndpoint: Send + Sync {
    async fn submit(&self, packet: &CaptionPacket) -> Result<DateTime<Utc>>;
}

/// Pluggable pacing policy: split a job into caption units.
pub trait CaptionSplitter: Send + Sync {
    fn split(&self, text: &str, start_ms: i64, stop_ms: i64) -> Vec<CaptionUnit>;
}

/// Default policy: utterances at or under the duration threshold are one
/// unit; longer ones split on word boundaries with timestamps interpolated
/// across the utterance span.
pub struct DurationSplitter {
    pub max_unit_secs: f64,
    pub max_unit_chars: usize,
}

impl Default for DurationSplitter {
    fn default() -> Self {
        Self {
            max_unit_secs: 5.0,
            max_unit_chars: 40,
        }
    }
}

impl CaptionSplitter for DurationSplitter {
    fn split(&self, text: &str, start_ms: i64, stop_ms: i64) -> Vec<CaptionUnit> {
        let duration_ms = (stop_ms - start_ms).max(0);
        if duration_ms as f64 <= self.max_unit_secs * 1000.0 {
            return vec![CaptionUnit {
                text: text.to_string(),
                at_ms: start_ms,
            }];
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > self.max_unit_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        if chunks.is_empty() {
            chunks.push(text.to_string());
        }

        let count = chunks.len() as i64;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| CaptionUnit {
                text: chunk,
                at_ms: start_ms + duration_ms * i as i64 / count,
            })
            .collect()
    }
}

/// Ordered slot queue feeding the packager: one receiver per utterance,
/// enqueued at submission time, completed when its translation resolves.
pub type CaptionSlotSender = mpsc::UnboundedSender<oneshot::Receiver<CaptionJob>>;
pub type CaptionSlotReceiver = mpsc::UnboundedReceiver<oneshot::Receiver<CaptionJob>>;

pub fn caption_slot_channel() -> (CaptionSlotSender, CaptionSlotReceiver) {
    mpsc::unbounded_channel()
}

/// Sequential caption submitter
pub struct CaptionPackager {
    endpoint: Arc<dyn CaptionEndpoint>,
    splitter: Arc<dyn CaptionSplitter>,
    stream_key: Option<String>,
    offset: Duration,
    display: SharedDisplay,
}

impl CaptionPackager {
    pub fn new(
        endpoint: Arc<dyn CaptionEndpoint>,
        splitter: Arc<dyn CaptionSplitter>,
        stream_key: Option<String>,
        offset_secs: f64,
        display: SharedDisplay,
    ) -> Self {
        Self {
            endpoint,
            splitter,
            stream_key,
            offset: Duration::milliseconds((offset_secs * 1000.0) as i64),
            display,
        }
    }

    /// Run the packager until the slot queue closes.
    pub fn spawn(self, slots: CaptionSlotReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(slots))
    }

    async fn run(self, mut slots: CaptionSlotReceiver) {
        while let Some(slot) = slots.recv().await {
            // A dropped sender means the translation failed; skip the slot
            // so later utterances are not blocked.
            let Ok(job) = slot.await else {
                debug!("Caption slot abandoned, skipping");
                continue;
            };
            self.deliver(job).await;
        }
        debug!("Caption packager stopped");
    }

    /// Submit one job's units sequentially, awaiting each outcome before the
    /// next so caption order matches utterance order.
    async fn deliver(&self, job: CaptionJob) {
        let Some(stream_key) = &self.stream_key else {
            return;
        };

        for unit in self.splitter.split(&job.text, job.start_ms, job.stop_ms) {
            let target = DateTime::<Utc>::from_timestamp_millis(unit.at_ms)
                .unwrap_or_else(Utc::now)
                + self.offset;
            let packet = CaptionPacket {
                seq: job.seq,
                text: unit.text,
                target_timestamp: target,
                stream_key: stream_key.clone(),
            };

            match self.endpoint.submit(&packet).await {
                Ok(delivered_at) => {
                    let round_trip =
                        (Utc::now() - delivered_at).num_milliseconds() as f64 / 1000.0;
                    debug!("Caption {} delivered (rtt {:.3}s)", packet.seq, round_trip);
                    let mut display = self.display.write().await;
                    if !display.record_delivery(
                        &packet.text,
                        Some(delivered_at),
                        true,
                        Some(round_trip),
                    ) {
                        // Split units carry partial text; fall back to the
                        // job-level entry.
                        display.record_delivery(&job.text, Some(delivered_at), true, Some(round_trip));
                    }
                }
                Err(e) => {
                    // Non-fatal: surface and keep going with the next packet.
                    warn!("Caption {} submission failed: {}", packet.seq, e);
                    let mut display = self.display.write().await;
                    if !display.record_delivery(&packet.text, None, false, None) {
                        display.record_delivery(&job.text, None, false, None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_utterance_is_a_single_unit() {
        let splitter = DurationSplitter::default();
        let units = splitter.split("witajće k nam", 1_000, 4_000);
        assert_eq!(
            units,
            vec![CaptionUnit {
                text: "witajće k nam".into(),
                at_ms: 1_000
            }]
        );
    }

    #[test]
    fn long_utterance_splits_on_word_boundaries() {
        let splitter = DurationSplitter::default();
        let text = "this is a rather long utterance that keeps going and going well past the unit limit";
        let units = splitter.split(text, 0, 12_000);

        assert!(units.len() > 1);
        for unit in &units {
            assert!(unit.text.len() <= 40, "unit too long: {:?}", unit.text);
            assert!(!unit.text.starts_with(' ') && !unit.text.ends_with(' '));
        }

        let rejoined = units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, text);

        // Timestamps advance monotonically across the utterance span.
        for pair in units.windows(2) {
            assert!(pair[0].at_ms < pair[1].at_ms);
        }
        assert_eq!(units[0].at_ms, 0);
        assert!(units.last().unwrap().at_ms < 12_000);
    }

    #[test]
    fn oversized_word_gets_its_own_unit() {
        let splitter = DurationSplitter {
            max_unit_secs: 1.0,
            max_unit_chars: 8,
        };
        let units = splitter.split("hi incomprehensibilities ok", 0, 10_000);
        assert_eq!(units.len(), 3);
        assert_eq!(units[1].text, "incomprehensibilities");
    }
}
