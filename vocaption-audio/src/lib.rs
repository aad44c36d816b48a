//! Vocaption audio capture
//!
//! Bridges a realtime cpal input callback into an asynchronous consumer via a
//! bounded, drop-oldest chunk queue.
//!
//! ```text
//! Audio device (cpal callback thread)
//!   │
//!   └─> ChunkQueue (bounded, newest-data-wins)
//!         │
//!         └─> async consumer (audio pump)
//! ```

pub mod buffer;
pub mod capture;
pub mod error;

pub use buffer::ChunkQueue;
pub use capture::{AudioCapture, DeviceInfo};
pub use error::{CaptureError, Result};

/// Default number of buffered audio chunks before the oldest is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Audio capture configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Input device index (None = system default).
    pub device_index: Option<usize>,
    /// Capture sample rate in Hz (default: 16000).
    pub sample_rate: u32,
    /// Number of channels (default: 1 = mono).
    pub channels: u16,
    /// Duration of one chunk in seconds (default: 0.5).
    pub chunk_duration_seconds: f32,
    /// Optional low-level blocksize override (frames per cpal callback).
    pub blocksize: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            sample_rate: 16_000,
            channels: 1,
            chunk_duration_seconds: 0.5,
            blocksize: None,
        }
    }
}

impl AudioConfig {
    /// Frames per chunk derived from sample rate and chunk duration.
    pub fn frames_per_chunk(&self) -> usize {
        (self.sample_rate as f32 * self.chunk_duration_seconds) as usize
    }
}
