//! Transcript event routing
//!
//! Sits between the recognizer channel and the translation pipeline: parses
//! inbound events, tracks the listening indicator, filters out partials and
//! placeholder payloads, and assigns sequence numbers. Numbering happens
//! after filtering, so discarded events never burn a sequence number, and
//! each issued number is persisted before the utterance moves on.

use chrono::Utc;
use tracing::{debug, warn};

use crate::counter::SequenceStore;
use crate::display::SharedDisplay;
use crate::transcript::{TranscriptEvent, Utterance};
use crate::translate::TranslationPipeline;

pub struct TranscriptRouter {
    pipeline: TranslationPipeline,
    display: SharedDisplay,
    store: SequenceStore,
    stream_key: Option<String>,
    last_seq: u64,
}

impl TranscriptRouter {
    /// Numbering resumes from the persisted counter when a stream key is
    /// configured; without one it starts at zero and is not persisted.
    pub fn new(
        pipeline: TranslationPipeline,
        display: SharedDisplay,
        store: SequenceStore,
        stream_key: Option<String>,
    ) -> Self {
        let last_seq = stream_key.as_deref().map_or(0, |key| store.get(key));
        Self {
            pipeline,
            display,
            store,
            stream_key,
            last_seq,
        }
    }

    pub async fn set_listening(&self, listening: bool) {
        self.display.write().await.listening = listening;
    }

    /// Process one raw recognizer message.
    pub async fn handle_message(&mut self, raw: &str) {
        let event = match TranscriptEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unparseable transcript event: {}", e);
                return;
            }
        };

        self.display.write().await.listening = event.listen;

        if let Some(partial) = event.partial.as_deref() {
            if !partial.is_empty() {
                debug!("Partial: {}", partial);
            }
        }

        let Some(text) = event.finalized_text() else {
            return;
        };

        let now = Utc::now().timestamp_millis();
        let start_ms = event.start_epoch_ms().unwrap_or(now);
        let stop_ms = event.stop_epoch_ms().unwrap_or(start_ms);
        let seq = self.next_seq();

        self.display.write().await.push_input(text.clone());
        self.pipeline.submit(Utterance {
            seq,
            text,
            tokens: event.tokens,
            start_ms,
            stop_ms,
        });
    }

    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        if let Some(key) = &self.stream_key {
            // Written through before the utterance proceeds so a restart
            // never reissues a number the endpoint already saw.
            if let Err(e) = self.store.set(key, self.last_seq) {
                warn!("Failed to persist sequence counter: {}", e);
            }
        }
        self.last_seq
    }
}
