//! f32 → S16 PCM frame encoder
//!
//! Accumulates floating-point samples into a bounded signed 16-bit frame and
//! emits the frame through the sink when full. The final, possibly partial,
//! frame is emitted by `finish()` at teardown.

use std::sync::Arc;

/// Callback receiving completed PCM frames
pub type FrameSink = Arc<dyn Fn(Vec<i16>) + Send + Sync>;

/// Fixed-capacity PCM frame encoder
///
/// Runs on the audio callback; all operations are bounded and infallible.
/// A frame that filled during the previous callback is flushed before new
/// samples are appended, and a frame that fills mid-run is flushed
/// immediately, so the write cursor never exceeds the capacity.
pub struct SampleEncoder {
    frame: Vec<i16>,
    capacity: usize,
    sink: FrameSink,
}

impl SampleEncoder {
    pub fn new(capacity: usize, sink: FrameSink) -> Self {
        Self {
            frame: Vec::with_capacity(capacity),
            capacity,
            sink,
        }
    }

    /// Append a run of samples, clamped to [-1, 1] and scaled to i16 range.
    ///
    /// An empty run performs no conversion work but still services a pending
    /// flush from the previous callback.
    pub fn push(&mut self, samples: &[f32]) {
        if self.frame.len() == self.capacity {
            self.flush();
        }

        for &sample in samples {
            if self.frame.len() == self.capacity {
                self.flush();
            }
            let clamped = sample.clamp(-1.0, 1.0);
            self.frame.push((32767.0 * clamped).round() as i16);
        }
    }

    /// Emit the remaining partial frame, if any. Called on stream stop.
    pub fn finish(&mut self) {
        if !self.frame.is_empty() {
            self.flush();
        }
    }

    /// Number of samples currently buffered
    pub fn pending(&self) -> usize {
        self.frame.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn flush(&mut self) {
        if self.frame.is_empty() {
            return;
        }
        let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(self.capacity));
        (self.sink)(frame);
    }
}
