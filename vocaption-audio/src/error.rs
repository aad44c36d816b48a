//! Error types for audio capture

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    /// The audio subsystem could not be initialised. Fatal to pipeline startup.
    #[error("Failed to initialise audio input: {0}")]
    Init(String),

    /// A read failed after the stream started. Fatal, stops the pipeline.
    #[error("Failed to read audio chunk: {0}")]
    Read(String),
}

impl CaptureError {
    pub fn init<S: Into<String>>(msg: S) -> Self {
        Self::Init(msg.into())
    }

    pub fn read<S: Into<String>>(msg: S) -> Self {
        Self::Read(msg.into())
    }
}
