//! Utterance pipeline: transcript routing, translation, captioning, playback
//!
//! Everything between the recognizer channel and the outside world lives
//! here. Data flows one way:
//!
//! ```text
//! recognizer events ──> TranscriptRouter ──> TranslationPipeline ─┬─> CaptionPackager ──> CaptionEndpoint
//!                            │                                    └─> SpeechSynthesizer ──> AudioPlaybackQueue
//!                            └──> DisplayState (listening flag, transcript, delivery outcomes)
//! ```
//!
//! Per-utterance translation tasks run concurrently, but the caption
//! packager consumes completion slots in submission order, so captions are
//! delivered in utterance order regardless of which translation finishes
//! first.

pub mod caption;
pub mod counter;
pub mod display;
pub mod error;
pub mod http;
pub mod playback;
pub mod router;
pub mod transcript;
pub mod translate;

pub use caption::{
    caption_slot_channel, CaptionEndpoint, CaptionJob, CaptionPackager, CaptionPacket,
    CaptionSlotReceiver, CaptionSlotSender, CaptionSplitter, CaptionUnit, DurationSplitter,
};
pub use counter::SequenceStore;
pub use display::{shared_display, DisplayState, SharedDisplay, TranslationEntry, UtteranceStatus};
pub use error::{PipelineError, Result};
pub use http::{ServiceClient, ServiceEndpoints};
pub use playback::{AudioPlaybackQueue, AudioSink, PlaybackSession};
pub use router::TranscriptRouter;
pub use transcript::{TranscriptEvent, Utterance, WordToken, PLACEHOLDER_TEXTS};
pub use translate::{
    SpeechSynthesizer, TranslationOptions, TranslationPipeline, TranslationRequest,
    TranslationResult, Translator, PASSTHROUGH_MODEL,
};
