//! HTTP clients for the translation, synthesis, and captioning services

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;

use crate::caption::{CaptionEndpoint, CaptionPacket};
use crate::error::{PipelineError, Result};
use crate::translate::{SpeechSynthesizer, TranslationRequest, TranslationResult, Translator};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Service URLs for one deployment
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub translation_url: String,
    pub synthesis_url: String,
    pub caption_url: String,
    pub caption_region: String,
}

/// Shared HTTP client implementing all three service traits
pub struct ServiceClient {
    http: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl ServiceClient {
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl Translator for ServiceClient {
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let response = self
            .http
            .post(&self.endpoints.translation_url)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Translation(format!(
                "{}: {}",
                status,
                error_message(&body)
            )));
        }

        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    speaker_id: &'a str,
}

#[async_trait]
impl SpeechSynthesizer for ServiceClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(&self.endpoints.synthesis_url)
            .json(&SynthesisBody {
                text,
                speaker_id: voice,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Synthesis(format!(
                "{}: {}",
                status,
                error_message(&body)
            )));
        }

        let clip = response.bytes().await?;
        debug!("Synthesized {} bytes of audio", clip.len());
        Ok(clip.to_vec())
    }
}

#[derive(Serialize)]
struct CaptionBody<'a> {
    cid: &'a str,
    seq: u64,
    timestamp: String,
    region: &'a str,
    text: &'a str,
}

#[async_trait]
impl CaptionEndpoint for ServiceClient {
    async fn submit(&self, packet: &CaptionPacket) -> Result<DateTime<Utc>> {
        let response = self
            .http
            .post(&self.endpoints.caption_url)
            .json(&CaptionBody {
                cid: &packet.stream_key,
                seq: packet.seq,
                timestamp: packet
                    .target_timestamp
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                region: &self.endpoints.caption_region,
                text: &packet.text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Caption(format!(
                "{}: {}",
                status,
                error_message(&body)
            )));
        }

        let body = response.text().await?;
        parse_delivery_timestamp(&body)
            .ok_or_else(|| PipelineError::Caption(format!("unparseable delivery time: {body:?}")))
    }
}

/// Pull a human-readable message out of a JSON error body, falling back to
/// the raw text.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .pointer("/errors/0/message")
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    body.trim().to_string()
}

/// The caption endpoint answers with the delivery timestamp as plain text,
/// sometimes without a zone designator.
fn parse_delivery_timestamp(body: &str) -> Option<DateTime<Utc>> {
    let trimmed = body.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(&format!("{trimmed}+00:00")))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_timestamp_accepts_zoned_and_naive_forms() {
        let zoned = parse_delivery_timestamp("2026-08-29T12:00:00.250+00:00").unwrap();
        assert_eq!(zoned.timestamp_millis() % 1000, 250);

        let naive = parse_delivery_timestamp("2026-08-29T12:00:00.250").unwrap();
        assert_eq!(naive, zoned);

        assert!(parse_delivery_timestamp("ok").is_none());
    }

    #[test]
    fn error_message_prefers_structured_errors() {
        let body = r#"{"errors":[{"message":"quota exceeded"}]}"#;
        assert_eq!(error_message(body), "quota exceeded");
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }
}
