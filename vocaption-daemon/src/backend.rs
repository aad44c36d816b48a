//! Streaming transcription backend contract
//!
//! Recognition engines are external collaborators: they accept raw PCM audio
//! chunks and emit a lazy sequence of transcript events. The daemon talks to
//! every engine through [`StreamingBackend`]; the bundled [`RemoteBackend`]
//! connects to an out-of-process engine over TCP (length-prefixed PCM out,
//! newline-delimited JSON events in).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{BackendKind, Settings};

/// One transcription update from the backend.
///
/// An utterance is zero or more non-final events with growing text followed
/// by exactly one final event (unless the stream ends early).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            speaker: None,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            speaker: None,
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to connect to transcription backend: {0}")]
    Connect(String),

    #[error("Backend not connected")]
    NotConnected,

    #[error("Backend transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Backend protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Interface for realtime speech-to-text streaming engines.
///
/// Methods take `&self` so one connected backend can serve the audio pump
/// and the transcript consumer concurrently (outbound audio and inbound
/// events flow at the same time).
#[async_trait]
pub trait StreamingBackend: Send + Sync {
    /// Open the engine session.
    async fn connect(&self) -> BackendResult<()>;

    /// Close the engine session.
    async fn disconnect(&self) -> BackendResult<()>;

    /// Stream one raw PCM audio chunk to the engine.
    async fn send_audio_chunk(&self, chunk: &[u8]) -> BackendResult<()>;

    /// Await the next transcript event; `None` once the stream has ended.
    async fn next_event(&self) -> BackendResult<Option<TranscriptEvent>>;
}

/// Construct the configured backend variant once from validated settings.
pub fn create_backend(settings: &Settings) -> Arc<dyn StreamingBackend> {
    match settings.backend.kind {
        BackendKind::Remote => Arc::new(RemoteBackend::new(&settings.backend.remote_addr)),
    }
}

/// TCP adapter for out-of-process recognition engines.
///
/// Wire format: each outbound audio chunk is a little-endian u32 byte length
/// followed by the PCM payload; each inbound line is one JSON
/// [`TranscriptEvent`]. Reader and writer halves sit behind separate locks so
/// sends never wait on event reads.
pub struct RemoteBackend {
    addr: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
}

impl RemoteBackend {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StreamingBackend for RemoteBackend {
    async fn connect(&self) -> BackendResult<()> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| BackendError::Connect(format!("{}: {e}", self.addr)))?;
        let (read_half, write_half) = stream.into_split();

        *self.reader.lock().await = Some(BufReader::new(read_half));
        *self.writer.lock().await = Some(write_half);

        debug!("Connected to transcription engine at {}", self.addr);
        Ok(())
    }

    async fn disconnect(&self) -> BackendResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
        Ok(())
    }

    async fn send_audio_chunk(&self, chunk: &[u8]) -> BackendResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(BackendError::NotConnected)?;

        writer.write_all(&(chunk.len() as u32).to_le_bytes()).await?;
        writer.write_all(chunk).await?;
        Ok(())
    }

    async fn next_event(&self) -> BackendResult<Option<TranscriptEvent>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(BackendError::NotConnected)?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event: TranscriptEvent = serde_json::from_str(trimmed)?;
            return Ok(Some(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_event_deserializes_without_speaker() {
        let event: TranscriptEvent =
            serde_json::from_str(r#"{"text": "saluton", "is_final": false}"#).unwrap();
        assert_eq!(event, TranscriptEvent::partial("saluton"));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let backend = RemoteBackend::new("127.0.0.1:1");
        assert!(matches!(
            backend.send_audio_chunk(b"pcm").await,
            Err(BackendError::NotConnected)
        ));
        assert!(matches!(
            backend.next_event().await,
            Err(BackendError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Engine side: read one framed chunk, answer with one event line.
        let engine = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).await.unwrap();

            stream
                .write_all(b"{\"text\": \"hi there.\", \"is_final\": true}\n")
                .await
                .unwrap();
            payload
        });

        let backend = RemoteBackend::new(addr.to_string());
        backend.connect().await.unwrap();
        backend.send_audio_chunk(&[1, 2, 3, 4]).await.unwrap();

        let event = backend.next_event().await.unwrap().unwrap();
        assert_eq!(event, TranscriptEvent::final_text("hi there."));

        assert_eq!(engine.await.unwrap(), vec![1, 2, 3, 4]);

        backend.disconnect().await.unwrap();
        // After the engine closes, the event stream simply ends.
        let backend2 = RemoteBackend::new(addr.to_string());
        assert!(matches!(
            backend2.next_event().await,
            Err(BackendError::NotConnected)
        ));
    }
}
