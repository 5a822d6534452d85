//! Session display state
//!
//! Holds what a UI would render: the listening indicator, the running input
//! transcript, and the translation list with per-utterance lifecycle state
//! and caption delivery outcomes. Results of requests that outlive their
//! session land here harmlessly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Per-utterance lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceStatus {
    Received,
    Translating,
    Packaging,
    Delivered,
    Failed,
}

/// One entry in the translation display list
#[derive(Debug, Clone)]
pub struct TranslationEntry {
    pub seq: u64,
    /// Translated (or passthrough) text
    pub text: String,
    pub status: UtteranceStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub round_trip_secs: Option<f64>,
}

impl TranslationEntry {
    pub fn new(seq: u64, text: String, status: UtteranceStatus) -> Self {
        Self {
            seq,
            text,
            status,
            delivered_at: None,
            success: None,
            round_trip_secs: None,
        }
    }
}

/// Mutable display state shared across the pipeline
#[derive(Debug, Default)]
pub struct DisplayState {
    pub listening: bool,
    pub input_lines: Vec<String>,
    pub translations: Vec<TranslationEntry>,
}

pub type SharedDisplay = Arc<RwLock<DisplayState>>;

pub fn shared_display() -> SharedDisplay {
    Arc::new(RwLock::new(DisplayState::default()))
}

impl DisplayState {
    pub fn push_input(&mut self, text: String) {
        self.input_lines.push(text);
    }

    pub fn push_translation(&mut self, entry: TranslationEntry) {
        self.translations.push(entry);
    }

    /// Advance the lifecycle state of an utterance's entry.
    pub fn mark_status(&mut self, seq: u64, status: UtteranceStatus) {
        if let Some(entry) = self.translations.iter_mut().find(|e| e.seq == seq) {
            entry.status = status;
        }
    }

    /// Record the translated text and move the entry to packaging.
    pub fn resolve_translation(&mut self, seq: u64, text: String) {
        if let Some(entry) = self.translations.iter_mut().find(|e| e.seq == seq) {
            entry.text = text;
            entry.status = UtteranceStatus::Packaging;
        }
    }

    /// Mark an utterance's translation as failed.
    pub fn fail_translation(&mut self, seq: u64) {
        if let Some(entry) = self.translations.iter_mut().find(|e| e.seq == seq) {
            entry.status = UtteranceStatus::Failed;
            entry.success = Some(false);
        }
    }

    /// Reconcile a caption delivery outcome into the matching entry.
    ///
    /// Matched by exact text against the first entry without an outcome, the
    /// pending-queue fallback for identical texts in flight. Returns false
    /// when nothing matched (e.g. the session already stopped and was
    /// cleared).
    pub fn record_delivery(
        &mut self,
        text: &str,
        delivered_at: Option<DateTime<Utc>>,
        success: bool,
        round_trip_secs: Option<f64>,
    ) -> bool {
        match self
            .translations
            .iter_mut()
            .find(|e| e.text == text && e.success.is_none())
        {
            Some(entry) => {
                entry.delivered_at = delivered_at;
                entry.success = Some(success);
                entry.round_trip_secs = round_trip_secs;
                entry.status = if success {
                    UtteranceStatus::Delivered
                } else {
                    UtteranceStatus::Failed
                };
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_matches_first_pending_entry_with_same_text() {
        let mut state = DisplayState::default();
        state.push_translation(TranslationEntry::new(
            1,
            "haj".into(),
            UtteranceStatus::Packaging,
        ));
        state.push_translation(TranslationEntry::new(
            2,
            "haj".into(),
            UtteranceStatus::Packaging,
        ));

        assert!(state.record_delivery("haj", Some(Utc::now()), true, Some(0.2)));
        assert_eq!(state.translations[0].success, Some(true));
        assert_eq!(state.translations[0].status, UtteranceStatus::Delivered);
        assert_eq!(state.translations[1].success, None);

        assert!(state.record_delivery("haj", None, false, None));
        assert_eq!(state.translations[1].status, UtteranceStatus::Failed);
    }

    #[test]
    fn delivery_for_unknown_text_is_ignored() {
        let mut state = DisplayState::default();
        assert!(!state.record_delivery("njeznate", None, true, None));
    }

    #[test]
    fn entry_walks_the_utterance_lifecycle() {
        let mut state = DisplayState::default();
        state.push_translation(TranslationEntry::new(
            1,
            "witaj".into(),
            UtteranceStatus::Received,
        ));

        state.mark_status(1, UtteranceStatus::Translating);
        assert_eq!(state.translations[0].status, UtteranceStatus::Translating);

        state.resolve_translation(1, "hallo".into());
        assert_eq!(state.translations[0].text, "hallo");
        assert_eq!(state.translations[0].status, UtteranceStatus::Packaging);

        assert!(state.record_delivery("hallo", Some(Utc::now()), true, Some(0.1)));
        assert_eq!(state.translations[0].status, UtteranceStatus::Delivered);
    }

    #[test]
    fn failed_translation_keeps_the_source_text() {
        let mut state = DisplayState::default();
        state.push_translation(TranslationEntry::new(
            3,
            "njepřełožene".into(),
            UtteranceStatus::Translating,
        ));

        state.fail_translation(3);
        assert_eq!(state.translations[0].status, UtteranceStatus::Failed);
        assert_eq!(state.translations[0].success, Some(false));
        assert_eq!(state.translations[0].text, "njepřełožene");
    }
}
