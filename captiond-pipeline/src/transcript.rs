//! Inbound transcript event wire format and text normalization
//!
//! The recognizer sends UTF-8 JSON with a string-typed `listen` flag and
//! second-resolution `start`/`stop` timestamps whose millisecond remainders
//! arrive separately as `startMs`/`stopMs`. Placeholder payloads emitted
//! while the backend model warms up are recognized by fixed sentinel strings
//! and never reach a consumer.

use serde::{Deserialize, Deserializer};

/// Warm-up placeholder payloads, discarded on sight
pub const PLACEHOLDER_TEXTS: [&str; 3] = [
    "-- ***/whisper/ggml-model.q8_0.bin --",
    "-- **/whisper/ggml-model.q8_0.bin --",
    "-- */whisper/ggml-model.q8_0.bin --",
];

/// Per-word confidence token from the recognizer
#[derive(Debug, Clone, Deserialize)]
pub struct WordToken {
    pub word: String,
    pub conf: f64,
    #[serde(default, deserialize_with = "spell_flag")]
    pub spell: Option<bool>,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

/// One inbound transcript event
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial: Option<String>,
    #[serde(default, deserialize_with = "listen_flag")]
    pub listen: bool,
    /// Utterance start, epoch seconds
    #[serde(default)]
    pub start: Option<f64>,
    /// Utterance end, epoch seconds
    #[serde(default)]
    pub stop: Option<f64>,
    /// Millisecond remainder of `start`
    #[serde(default, rename = "startMs")]
    pub start_ms: Option<u32>,
    /// Millisecond remainder of `stop`
    #[serde(default, rename = "stopMs")]
    pub stop_ms: Option<u32>,
    #[serde(default, rename = "result")]
    pub tokens: Option<Vec<WordToken>>,
}

impl TranscriptEvent {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Utterance start as epoch milliseconds, if the recognizer sent timing.
    pub fn start_epoch_ms(&self) -> Option<i64> {
        self.start
            .map(|secs| secs as i64 * 1000 + i64::from(self.start_ms.unwrap_or(0)))
    }

    /// Utterance end as epoch milliseconds, if the recognizer sent timing.
    pub fn stop_epoch_ms(&self) -> Option<i64> {
        self.stop
            .map(|secs| secs as i64 * 1000 + i64::from(self.stop_ms.unwrap_or(0)))
    }

    /// Derive the finalized plain text, or `None` when the event must be
    /// discarded (no text, warm-up placeholder, no alphanumeric content, or
    /// empty after normalization).
    pub fn finalized_text(&self) -> Option<String> {
        let raw = self.text.as_deref()?;
        if raw.is_empty() || is_placeholder(raw) || !has_alphanumeric(raw) {
            return None;
        }

        let text = match &self.tokens {
            Some(tokens) if !tokens.is_empty() => tokens
                .iter()
                .map(|t| t.word.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            _ => normalize_text(raw),
        };

        if text.is_empty() {
            return None;
        }
        Some(text)
    }
}

/// Finalized unit of recognized speech
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Strictly increasing within a session, resumed from the persisted
    /// counter when a stream key is configured
    pub seq: u64,
    pub text: String,
    pub tokens: Option<Vec<WordToken>>,
    /// Utterance start, epoch milliseconds
    pub start_ms: i64,
    /// Utterance end, epoch milliseconds
    pub stop_ms: i64,
}

pub fn is_placeholder(text: &str) -> bool {
    PLACEHOLDER_TEXTS.contains(&text)
}

fn has_alphanumeric(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Trim whitespace and strip surrounding quote characters.
pub fn normalize_text(raw: &str) -> String {
    let quotes: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', '\u{201e}'];
    raw.trim().trim_matches(quotes).trim().to_string()
}

fn listen_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Bool(b)) => b,
        Some(Raw::Text(s)) => s == "true",
        None => false,
    })
}

fn spell_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Num(i64),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Bool(b) => b,
        Raw::Num(n) => n == 1,
        Raw::Text(s) => s == "1" || s == "true",
    }))
}
