//! Vocaption daemon library
//!
//! Re-exports the daemon's modules for integration testing and embedding.

pub mod backend;
pub mod caption;
pub mod config;
pub mod normalize;
pub mod notifier;
pub mod pipeline;
pub mod transcript_log;

pub use backend::{create_backend, BackendError, StreamingBackend, TranscriptEvent};
pub use caption::CaptionPublisher;
pub use config::Settings;
pub use pipeline::{AudioSource, Phase, Pipeline, PipelineState, ShutdownHandle};
