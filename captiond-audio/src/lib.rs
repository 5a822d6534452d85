//! captiond audio capture
//!
//! Captures live microphone audio with cpal and encodes it into fixed-width
//! signed 16-bit PCM frames for streaming to the recognition backend.
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal)
//!   │
//!   └─> SampleEncoder (f32 → i16, bounded frame buffer)
//!         │
//!         └─> FrameSink callback (one-way handoff to the session)
//! ```
//!
//! The encoder runs inside the cpal audio callback and never blocks; emitted
//! frames cross into the orchestration context through the injected sink
//! (typically an unbounded channel sender).

pub mod capture;
pub mod encoder;
pub mod error;

pub use capture::{CaptureSession, DeviceInfo};
pub use encoder::{FrameSink, SampleEncoder};
pub use error::{AudioError, Result};

use serde::{Deserialize, Serialize};

/// Default capture sample rate (the recognizer accepts the raw device rate)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default PCM frame capacity in samples
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Capture configuration
///
/// The echo/noise/gain flags are part of the recognized configuration
/// surface; cpal exposes no processing toggles, so they are recorded in the
/// config and logged at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Requested sample rate (default: 48000 Hz)
    pub sample_rate: u32,
    /// Number of channels (default: 1 = mono)
    pub channel_count: u16,
    /// PCM frame capacity in samples (default: 4096)
    pub buffer_size: usize,
    /// Echo cancellation requested
    pub echo_cancellation: bool,
    /// Noise suppression requested
    pub noise_suppression: bool,
    /// Automatic gain control requested
    pub auto_gain_control: bool,
    /// Input device name (None = default device)
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: 1,
            buffer_size: DEFAULT_FRAME_SIZE,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            device: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_capture_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channel_count, 1);
        assert_eq!(config.buffer_size, 4096);
        assert!(!config.echo_cancellation);
        assert!(config.device.is_none());
    }
}
