//! Per-utterance translation and speech synthesis
//!
//! Each finalized utterance gets its own task so a slow translation never
//! stalls recognition. Ordering toward the caption packager is preserved by
//! reserving a completion slot before the task starts: the slot is resolved
//! with the finished job, or dropped when translation fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::caption::{CaptionJob, CaptionSlotSender};
use crate::display::{SharedDisplay, TranslationEntry, UtteranceStatus};
use crate::error::Result;
use crate::playback::PlaybackSession;
use crate::transcript::Utterance;

/// Model identifier that bypasses the translation service entirely
pub const PASSTHROUGH_MODEL: &str = "passthrough";

/// Request to the translation service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    pub model: String,
    pub source_language: String,
    pub target_language: String,
}

/// Response from the translation service
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationResult {
    pub translation: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResult>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text to an encoded audio clip.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Language pair and model selection for a session
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    pub model: String,
    pub source_language: String,
    pub target_language: String,
    pub voice: String,
}

/// Fans finalized utterances out to translation tasks
pub struct TranslationPipeline {
    translator: Arc<dyn Translator>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    options: TranslationOptions,
    playback: Option<PlaybackSession>,
    display: SharedDisplay,
    slots: CaptionSlotSender,
}

impl TranslationPipeline {
    pub fn new(
        translator: Arc<dyn Translator>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        options: TranslationOptions,
        playback: Option<PlaybackSession>,
        display: SharedDisplay,
        slots: CaptionSlotSender,
    ) -> Self {
        Self {
            translator,
            synthesizer,
            options,
            playback,
            display,
            slots,
        }
    }

    /// Submit one utterance. Returns immediately; translation, display
    /// updates, captioning and synthesis all happen on spawned tasks.
    pub fn submit(&self, utterance: Utterance) {
        // Reserve the caption slot now so packager order follows submission
        // order, not completion order.
        let (tx, rx) = oneshot::channel();
        if self.slots.send(rx).is_err() {
            warn!("Caption packager gone, dropping utterance {}", utterance.seq);
            return;
        }

        let handle = self.handle();

        if self.options.model == PASSTHROUGH_MODEL {
            tokio::spawn(async move {
                let text = utterance.text.clone();
                handle.display.write().await.push_translation(TranslationEntry::new(
                    utterance.seq,
                    text.clone(),
                    UtteranceStatus::Packaging,
                ));
                handle.deliver(text, &utterance, tx);
            });
            return;
        }

        let translator = self.translator.clone();
        let request = TranslationRequest {
            text: utterance.text.clone(),
            model: self.options.model.clone(),
            source_language: self.options.source_language.clone(),
            target_language: self.options.target_language.clone(),
        };
        tokio::spawn(async move {
            handle.display.write().await.push_translation(TranslationEntry::new(
                utterance.seq,
                utterance.text.clone(),
                UtteranceStatus::Received,
            ));

            handle
                .display
                .write()
                .await
                .mark_status(utterance.seq, UtteranceStatus::Translating);
            match translator.translate(&request).await {
                Ok(result) => {
                    debug!(
                        "Translated utterance {} via {}",
                        utterance.seq,
                        result.model.as_deref().unwrap_or(&request.model)
                    );
                    handle
                        .display
                        .write()
                        .await
                        .resolve_translation(utterance.seq, result.translation.clone());
                    handle.deliver(result.translation, &utterance, tx);
                }
                Err(e) => {
                    // Dropping tx releases the caption slot so later
                    // utterances are not held up.
                    warn!("Translation failed for utterance {}: {}", utterance.seq, e);
                    drop(tx);
                    handle.display.write().await.fail_translation(utterance.seq);
                }
            }
        });
    }

    fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            synthesizer: self.synthesizer.clone(),
            voice: self.options.voice.clone(),
            playback: self.playback.clone(),
            display: self.display.clone(),
        }
    }
}

/// Cheap clone of the pipeline for use inside spawned tasks
struct PipelineHandle {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    voice: String,
    playback: Option<PlaybackSession>,
    display: SharedDisplay,
}

impl PipelineHandle {
    /// Resolve the caption slot and kick off synthesis when configured.
    fn deliver(&self, text: String, utterance: &Utterance, tx: oneshot::Sender<CaptionJob>) {
        let seq = utterance.seq;
        let job = CaptionJob {
            seq,
            text: text.clone(),
            start_ms: utterance.start_ms,
            stop_ms: utterance.stop_ms,
        };
        if tx.send(job).is_err() {
            debug!("Caption packager stopped before utterance {}", seq);
        }

        if let (Some(synthesizer), Some(playback)) = (&self.synthesizer, &self.playback) {
            let synthesizer = synthesizer.clone();
            let playback = playback.clone();
            let voice = self.voice.clone();
            tokio::spawn(async move {
                match synthesizer.synthesize(&text, &voice).await {
                    Ok(clip) => playback.enqueue(clip).await,
                    Err(e) => warn!("Synthesis failed for utterance {}: {}", seq, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::caption_slot_channel;
    use crate::display::shared_display;
    use crate::error::PipelineError;
    use std::time::Duration;

    struct FixedTranslator {
        fail: bool,
    }

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResult> {
            if self.fail {
                return Err(PipelineError::Translation("upstream 500".into()));
            }
            Ok(TranslationResult {
                translation: format!("de:{}", request.text),
                model: Some(request.model.clone()),
            })
        }
    }

    fn options(model: &str) -> TranslationOptions {
        TranslationOptions {
            model: model.into(),
            source_language: "hsb".into(),
            target_language: "de".into(),
            voice: "weronika".into(),
        }
    }

    fn utterance(seq: u64, text: &str) -> Utterance {
        Utterance {
            seq,
            text: text.into(),
            tokens: None,
            start_ms: 0,
            stop_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn successful_translation_resolves_the_caption_slot() {
        let display = shared_display();
        let (slot_tx, mut slot_rx) = caption_slot_channel();
        let pipeline = TranslationPipeline::new(
            Arc::new(FixedTranslator { fail: false }),
            None,
            options("ctranslate"),
            None,
            display.clone(),
            slot_tx,
        );

        pipeline.submit(utterance(7, "witaj"));

        let slot = slot_rx.recv().await.unwrap();
        let job = slot.await.unwrap();
        assert_eq!(job.seq, 7);
        assert_eq!(job.text, "de:witaj");

        let state = display.read().await;
        assert_eq!(state.translations.len(), 1);
        assert_eq!(state.translations[0].text, "de:witaj");
        assert_eq!(state.translations[0].status, UtteranceStatus::Packaging);
    }

    #[tokio::test]
    async fn failed_translation_abandons_the_slot() {
        let display = shared_display();
        let (slot_tx, mut slot_rx) = caption_slot_channel();
        let pipeline = TranslationPipeline::new(
            Arc::new(FixedTranslator { fail: true }),
            None,
            options("ctranslate"),
            None,
            display.clone(),
            slot_tx,
        );

        pipeline.submit(utterance(1, "witaj"));

        let slot = slot_rx.recv().await.unwrap();
        assert!(slot.await.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let state = display.read().await;
        assert_eq!(state.translations[0].status, UtteranceStatus::Failed);
        assert_eq!(state.translations[0].success, Some(false));
        assert_eq!(state.translations[0].text, "witaj");
    }

    #[tokio::test]
    async fn passthrough_skips_the_translator() {
        let display = shared_display();
        let (slot_tx, mut slot_rx) = caption_slot_channel();
        let pipeline = TranslationPipeline::new(
            Arc::new(FixedTranslator { fail: true }),
            None,
            options(PASSTHROUGH_MODEL),
            None,
            display,
            slot_tx,
        );

        pipeline.submit(utterance(2, "dobry dźeń"));

        let job = slot_rx.recv().await.unwrap().await.unwrap();
        assert_eq!(job.text, "dobry dźeń");
    }
}
