//! Audio capture with cpal
//!
//! Opens the input device on a dedicated thread (a `cpal::Stream` is not
//! `Send`), frames the callback data into fixed-duration PCM chunks and
//! pushes them into the bounded [`ChunkQueue`].

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tracing::{debug, info, warn};

use crate::buffer::ChunkQueue;
use crate::error::{CaptureError, Result};
use crate::{AudioConfig, DEFAULT_QUEUE_CAPACITY};

/// Audio input device information for CLI listing.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub default_sample_rate: u32,
}

/// One microphone capture session.
///
/// `start()` opens the hardware stream and hands back the chunk queue;
/// `stop()` (or `Drop`) always stops and closes the stream, after which the
/// queue terminates its sequence instead of blocking forever.
pub struct AudioCapture {
    config: AudioConfig,
    queue: ChunkQueue,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            queue: ChunkQueue::new(DEFAULT_QUEUE_CAPACITY),
            shutdown_tx: None,
            thread: None,
        }
    }

    /// List available input devices.
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for (index, device) in host
            .input_devices()
            .map_err(|e| CaptureError::init(format!("failed to enumerate devices: {e}")))?
            .enumerate()
        {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {index}"));
            let (channels, default_sample_rate) = device
                .default_input_config()
                .map(|c| (c.channels(), c.sample_rate().0))
                .unwrap_or((0, 0));

            devices.push(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                channels,
                default_sample_rate,
            });
        }

        Ok(devices)
    }

    /// Start the capture session and return the chunk queue handle.
    pub fn start(&mut self) -> Result<ChunkQueue> {
        if self.thread.is_some() {
            warn!("Audio capture already started");
            return Ok(self.queue.clone());
        }

        let frames_per_chunk = self.config.frames_per_chunk();
        if frames_per_chunk == 0 {
            return Err(CaptureError::init(
                "chunk duration and sample rate produce zero frames",
            ));
        }

        self.queue = ChunkQueue::new(DEFAULT_QUEUE_CAPACITY);

        let config = self.config.clone();
        let queue = self.queue.clone();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("vocaption-capture".into())
            .spawn(move || capture_thread(config, frames_per_chunk, queue, init_tx, shutdown_rx))
            .map_err(|e| CaptureError::init(format!("failed to spawn capture thread: {e}")))?;

        // The thread reports stream initialisation synchronously so hardware
        // failures surface as a single capture-initialisation error.
        match init_rx.recv() {
            Ok(Ok(())) => {
                self.shutdown_tx = Some(shutdown_tx);
                self.thread = Some(thread);
                info!(
                    "Audio capture started ({} Hz, {} ch, {:.2}s chunks)",
                    self.config.sample_rate, self.config.channels, self.config.chunk_duration_seconds
                );
                Ok(self.queue.clone())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::init("capture thread exited during startup"))
            }
        }
    }

    /// Stop the capture session. The hardware stream is stopped and closed
    /// and the chunk queue terminates its sequence.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown_tx = None; // dropping the sender unblocks the thread
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| CaptureError::read("capture thread panicked"))?;
            info!("Audio capture stopped");
        }
        self.queue.close();
        Ok(())
    }

    /// Handle to the chunk queue of the current session.
    pub fn chunks(&self) -> ChunkQueue {
        self.queue.clone()
    }

    pub fn is_active(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

/// Owns the cpal stream for the lifetime of one session.
fn capture_thread(
    config: AudioConfig,
    frames_per_chunk: usize,
    queue: ChunkQueue,
    init_tx: mpsc::Sender<Result<()>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    match open_stream(&config, frames_per_chunk, queue.clone()) {
        Ok(stream) => {
            let _ = init_tx.send(Ok(()));
            // Parked until stop() drops the sender or sends explicitly.
            let _ = shutdown_rx.recv();
            drop(stream);
            queue.close();
        }
        Err(err) => {
            let _ = init_tx.send(Err(err));
        }
    }
}

fn open_stream(config: &AudioConfig, frames_per_chunk: usize, queue: ChunkQueue) -> Result<Stream> {
    let host = cpal::default_host();

    let device = match config.device_index {
        Some(index) => host
            .input_devices()
            .map_err(|e| CaptureError::init(format!("failed to enumerate devices: {e}")))?
            .nth(index)
            .ok_or_else(|| CaptureError::init(format!("device index {index} not found")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::init("no default input device found"))?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    debug!("Opening input device: {device_name}");

    let blocksize = config.blocksize.unwrap_or(frames_per_chunk);
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(blocksize as u32),
    };

    let chunk_bytes = frames_per_chunk * config.channels as usize * 2;
    let mut accumulator: Vec<u8> = Vec::with_capacity(chunk_bytes * 2);
    let error_queue = queue.clone();

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for sample in data {
                    accumulator.extend_from_slice(&sample.to_le_bytes());
                }
                while accumulator.len() >= chunk_bytes {
                    let chunk: Vec<u8> = accumulator.drain(..chunk_bytes).collect();
                    queue.push(chunk);
                }
            },
            move |err| {
                error_queue.fail(CaptureError::read(format!("audio stream error: {err}")));
            },
            None,
        )
        .map_err(|e| CaptureError::init(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CaptureError::init(format!("failed to start input stream: {e}")))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frame_chunking_is_init_error() {
        let mut capture = AudioCapture::new(AudioConfig {
            chunk_duration_seconds: 0.0,
            ..Default::default()
        });

        let err = capture.start().unwrap_err();
        assert!(matches!(err, CaptureError::Init(_)));
        assert!(!capture.is_active());
    }

    #[test]
    fn test_capture_creation_is_inert() {
        let capture = AudioCapture::new(AudioConfig::default());
        assert!(!capture.is_active());
        assert!(capture.chunks().is_empty());
    }

    #[test]
    fn test_frames_per_chunk() {
        let config = AudioConfig {
            sample_rate: 16_000,
            chunk_duration_seconds: 0.5,
            ..Default::default()
        };
        assert_eq!(config.frames_per_chunk(), 8_000);
    }
}
