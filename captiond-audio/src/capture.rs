//! Microphone capture with cpal
//!
//! Owns the audio device and input stream for the lifetime of a recording
//! session. The `SampleEncoder` runs inside the cpal callback and hands
//! completed PCM frames to the session through the injected `FrameSink`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::encoder::{FrameSink, SampleEncoder};
use crate::error::{AudioError, Result};
use crate::CaptureConfig;

/// Audio input device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// Capture session: device + stream + encoder, torn down atomically on stop
pub struct CaptureSession {
    config: CaptureConfig,
    host: Host,
    encoder: Arc<Mutex<SampleEncoder>>,
    stream: Option<Stream>,
    device: Option<Device>,
    is_capturing: Arc<AtomicBool>,
    total_samples: Arc<AtomicUsize>,
}

// `cpal::Stream` is `!Send` as a conservative marker for platforms with
// thread-affine stream handles (e.g. Android AAudio); on the backends we
// target the handle is only held and dropped here, and all capture control
// flows through the `Arc`'d atomics, so moving the session between threads
// is sound.
unsafe impl Send for CaptureSession {}

impl CaptureSession {
    pub fn new(config: CaptureConfig, sink: FrameSink) -> Self {
        let encoder = Arc::new(Mutex::new(SampleEncoder::new(config.buffer_size, sink)));

        Self {
            config,
            host: cpal::default_host(),
            encoder,
            stream: None,
            device: None,
            is_capturing: Arc::new(AtomicBool::new(false)),
            total_samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// List all available audio input devices
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_input = host.default_input_device();
        let default_name = default_input.as_ref().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for (index, device) in host
            .input_devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
            .enumerate()
        {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {}", index));

            let (max_input_channels, default_sample_rate) =
                match device.default_input_config() {
                    Ok(config) => (config.channels(), config.sample_rate().0),
                    Err(_) => (0, 0),
                };

            devices.push(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
                default_sample_rate,
            });
        }

        Ok(devices)
    }

    /// Start capturing. Device unavailable or permission problems surface as
    /// `AudioError::DeviceError`; the session never transitions to capturing.
    pub fn start(&mut self) -> Result<()> {
        if self.is_capturing.load(Ordering::Relaxed) {
            warn!("Capture already running");
            return Ok(());
        }

        let device = self.select_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::device(format!("Failed to get device config: {}", e)))?;
        let source_channels = supported_config.channels();

        info!(
            device = %device_name,
            sample_rate = self.config.sample_rate,
            channels = source_channels,
            frame_size = self.config.buffer_size,
            "Starting audio capture"
        );
        if self.config.echo_cancellation
            || self.config.noise_suppression
            || self.config.auto_gain_control
        {
            debug!(
                echo_cancellation = self.config.echo_cancellation,
                noise_suppression = self.config.noise_suppression,
                auto_gain_control = self.config.auto_gain_control,
                "Input processing flags requested (not applied by the cpal backend)"
            );
        }

        let stream_config = StreamConfig {
            channels: source_channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        self.total_samples.store(0, Ordering::Relaxed);

        let encoder = Arc::clone(&self.encoder);
        let is_capturing = Arc::clone(&self.is_capturing);
        let total_samples = Arc::clone(&self.total_samples);
        let target_channels = self.config.channel_count;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }

                    // First channel only when downmixing; averaging halves
                    // the amplitude when the mic sits in one channel.
                    if source_channels > target_channels {
                        let mono: Vec<f32> = data
                            .chunks(source_channels as usize)
                            .map(|frame| frame[0])
                            .collect();
                        total_samples.fetch_add(mono.len(), Ordering::Relaxed);
                        encoder.lock().push(&mono);
                    } else {
                        total_samples.fetch_add(data.len(), Ordering::Relaxed);
                        encoder.lock().push(data);
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::stream(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.device = Some(device);
        self.is_capturing.store(true, Ordering::Relaxed);

        info!("Audio capture started");
        Ok(())
    }

    /// Stop capturing and flush the final partial frame. Idempotent; safe to
    /// call after abrupt device loss.
    pub fn stop(&mut self) {
        if !self.is_capturing.swap(false, Ordering::Relaxed) {
            return;
        }

        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.device = None;

        self.encoder.lock().finish();

        let total = self.total_samples.load(Ordering::Relaxed);
        let duration = total as f32 / self.config.sample_rate as f32;
        info!("Captured {} samples ({:.2}s)", total, duration);
    }

    pub fn is_active(&self) -> bool {
        self.is_capturing.load(Ordering::Relaxed)
    }

    fn select_device(&self) -> Result<Device> {
        match &self.config.device {
            Some(wanted) => {
                let mut devices = self
                    .host
                    .input_devices()
                    .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;
                devices
                    .find(|d| d.name().map(|n| n == *wanted).unwrap_or(false))
                    .ok_or_else(|| {
                        AudioError::device(format!("Input device '{}' not found", wanted))
                    })
            }
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| AudioError::device("No default input device found")),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
