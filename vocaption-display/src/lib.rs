//! Live caption broadcast server for vocaption UI clients
//!
//! TCP listener pushing newline-delimited JSON caption updates to any number
//! of connected display clients (a browser bridge, an overlay widget, a
//! terminal viewer). Two message shapes exist:
//!
//! - `{"type": "partial", "text": "...", "speaker": null}` for in-progress text
//! - `{"type": "final", "text": "...", "speaker": null}` for a completed utterance
//!
//! Clients that joined late receive the latest caption as catch-up. Slow or
//! dead clients are pruned on the next broadcast; a display failure never
//! propagates to the transcription pipeline.

pub mod client;
pub mod error;
pub mod message;
pub mod server;

pub use error::{DisplayError, Result};
pub use message::CaptionMessage;
pub use server::DisplayServer;
