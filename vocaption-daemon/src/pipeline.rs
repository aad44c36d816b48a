//! Pipeline orchestration
//!
//! Wires microphone capture, the streaming transcription backend and the
//! caption sinks into one session: an audio pump pushes PCM chunks to the
//! engine while a transcript consumer fans events out to the sinks. Either
//! task failing, or a shutdown request, ends the session; teardown always
//! runs, releasing every component in reverse startup order.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use vocaption_audio::{AudioCapture, AudioConfig, CaptureError, ChunkQueue};
use vocaption_display::{CaptionMessage, DisplayServer};

use crate::backend::{StreamingBackend, TranscriptEvent};
use crate::caption::CaptionPublisher;
use crate::config::Settings;
use crate::normalize::normalize;
use crate::notifier::Notifier;
use crate::transcript_log::TranscriptLog;

/// Lifecycle phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Provider of chunked microphone audio.
///
/// [`AudioCapture`] is the production implementation; tests substitute a
/// scripted source so no audio hardware is needed.
pub trait AudioSource: Send {
    fn start(&mut self) -> std::result::Result<ChunkQueue, CaptureError>;
    fn stop(&mut self) -> std::result::Result<(), CaptureError>;
}

impl AudioSource for AudioCapture {
    fn start(&mut self) -> std::result::Result<ChunkQueue, CaptureError> {
        AudioCapture::start(self)
    }

    fn stop(&mut self) -> std::result::Result<(), CaptureError> {
        AudioCapture::stop(self)
    }
}

/// Accumulated transcription results for one session.
#[derive(Debug, Default)]
pub struct PipelineState {
    final_transcripts: Vec<String>,
    latest_partial: Option<String>,
}

impl PipelineState {
    /// Record a (normalized) transcript event. Returns the caption text to
    /// publish when the event completed an utterance.
    pub fn add_result(&mut self, event: &TranscriptEvent) -> Option<String> {
        if event.text.is_empty() {
            return None;
        }

        if event.is_final {
            self.final_transcripts.push(event.text.clone());
            self.latest_partial = None;
            Some(event.text.clone())
        } else {
            self.latest_partial = Some(event.text.clone());
            None
        }
    }

    pub fn final_transcripts(&self) -> &[String] {
        &self.final_transcripts
    }

    pub fn latest_partial(&self) -> Option<&str> {
        self.latest_partial.as_deref()
    }

    /// All finalized utterances joined into one text.
    pub fn full_transcript(&self) -> String {
        self.final_transcripts.join(" ")
    }
}

/// Handle for requesting a cooperative pipeline stop from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<Notify>,
}

impl ShutdownHandle {
    /// Ask the running pipeline to stop. Stores a permit, so a request made
    /// before the pipeline reaches its main loop is not lost.
    pub fn request_stop(&self) {
        self.shutdown.notify_one();
    }
}

/// One capture-transcribe-publish session.
pub struct Pipeline {
    settings: Settings,
    backend: Arc<dyn StreamingBackend>,
    source: Mutex<Box<dyn AudioSource>>,
    transcript_log: Arc<TranscriptLog>,
    caption: Arc<CaptionPublisher>,
    notifier: Arc<Notifier>,
    display: Option<Arc<DisplayServer>>,
    state: Arc<Mutex<PipelineState>>,
    phase: Mutex<Phase>,
    shutdown: Arc<Notify>,
}

impl Pipeline {
    pub fn new(settings: Settings, backend: Arc<dyn StreamingBackend>) -> Result<Self> {
        let audio = &settings.audio;
        let capture = AudioCapture::new(AudioConfig {
            device_index: audio.device_index,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            chunk_duration_seconds: audio.chunk_duration_seconds,
            blocksize: audio.blocksize,
        });
        Self::with_source(settings, backend, Box::new(capture))
    }

    /// Build a pipeline with an explicit audio source.
    pub fn with_source(
        settings: Settings,
        backend: Arc<dyn StreamingBackend>,
        source: Box<dyn AudioSource>,
    ) -> Result<Self> {
        settings.validate()?;

        let display = settings.display.enabled.then(|| {
            Arc::new(DisplayServer::new(
                settings.display.host.clone(),
                settings.display.port,
            ))
        });

        Ok(Self {
            transcript_log: Arc::new(TranscriptLog::new(settings.transcript_log.clone())),
            caption: Arc::new(CaptionPublisher::new(settings.caption.clone())?),
            notifier: Arc::new(Notifier::new(settings.notifier.clone())),
            display,
            settings,
            backend,
            source: Mutex::new(source),
            state: Arc::new(Mutex::new(PipelineState::default())),
            phase: Mutex::new(Phase::Idle),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Run one session to completion.
    ///
    /// Returns when the audio stream ends, the backend event stream ends, a
    /// pump or consumer error occurs, or a [`ShutdownHandle`] requests a
    /// stop. Teardown runs on every exit path, including startup failures.
    pub async fn run(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                Phase::Idle | Phase::Stopped => *phase = Phase::Starting,
                _ => bail!("Pipeline is already running"),
            }
        }

        let queue = match self.startup().await {
            Ok(queue) => queue,
            Err(e) => {
                // Unwind whatever did come up before the failure.
                *self.phase.lock() = Phase::Stopping;
                self.teardown().await;
                *self.phase.lock() = Phase::Stopped;
                return Err(e);
            }
        };

        *self.phase.lock() = Phase::Running;
        info!("Pipeline running");

        let result = self.main_loop(queue).await;

        *self.phase.lock() = Phase::Stopping;
        self.teardown().await;
        *self.phase.lock() = Phase::Stopped;

        result
    }

    /// Bring every component up; sinks first so no transcript can arrive
    /// before its destinations exist, the backend last.
    async fn startup(&self) -> Result<ChunkQueue> {
        self.transcript_log.open()?;
        self.caption.start().await?;

        if let Some(display) = &self.display {
            display
                .start()
                .await
                .context("Failed to start caption display server")?;
        }

        let queue = self
            .source
            .lock()
            .start()
            .context("Failed to start audio capture")?;

        self.backend
            .connect()
            .await
            .context("Failed to connect to transcription backend")?;

        Ok(queue)
    }

    async fn main_loop(&self, queue: ChunkQueue) -> Result<()> {
        let mut pump = tokio::spawn(pump_audio(queue, Arc::clone(&self.backend)));
        let mut consumer = tokio::spawn(consume_transcripts(
            Arc::clone(&self.backend),
            Arc::clone(&self.state),
            Arc::clone(&self.transcript_log),
            Arc::clone(&self.caption),
            Arc::clone(&self.notifier),
            self.display.clone(),
        ));

        // First finisher wins; the sibling is cancelled and awaited so no
        // task outlives the session.
        tokio::select! {
            result = &mut pump => {
                consumer.abort();
                let _ = consumer.await;
                flatten(result, "audio pump")
            }
            result = &mut consumer => {
                pump.abort();
                let _ = pump.await;
                flatten(result, "transcript consumer")
            }
            _ = self.shutdown.notified() => {
                info!("Shutdown requested");
                pump.abort();
                consumer.abort();
                let _ = pump.await;
                let _ = consumer.await;
                Ok(())
            }
        }
    }

    /// Release every component in reverse startup order. Failures are
    /// logged; teardown always completes.
    async fn teardown(&self) {
        if let Err(e) = self.backend.disconnect().await {
            warn!("Backend disconnect failed: {e}");
        }

        if let Err(e) = self.source.lock().stop() {
            warn!("Audio capture stop failed: {e}");
        }

        if let Some(display) = &self.display {
            if display.is_running().await {
                if let Err(e) = display.stop().await {
                    warn!("Display server stop failed: {e}");
                }
            }
        }

        self.caption.close().await;
        self.notifier.close().await;
        self.transcript_log.close();

        info!("Pipeline stopped");
    }

    /// Handle for requesting a stop from another task (e.g. a signal
    /// handler).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Accumulated results of the current or most recent session.
    pub fn state(&self) -> Arc<Mutex<PipelineState>> {
        Arc::clone(&self.state)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn caption_publisher(&self) -> Arc<CaptionPublisher> {
        Arc::clone(&self.caption)
    }

    /// Bound address of the display server, when enabled and running.
    pub async fn display_addr(&self) -> Option<SocketAddr> {
        match &self.display {
            Some(display) => display.local_addr().await,
            None => None,
        }
    }

    /// Number of connected display clients, when the display is enabled.
    pub async fn display_client_count(&self) -> Option<usize> {
        match &self.display {
            Some(display) => Some(display.client_count().await),
            None => None,
        }
    }
}

fn flatten(result: std::result::Result<Result<()>, JoinError>, task: &str) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(anyhow!("{task} task panicked: {e}")),
    }
}

/// Forward captured audio chunks to the backend until the capture session
/// ends or either side fails.
async fn pump_audio(queue: ChunkQueue, backend: Arc<dyn StreamingBackend>) -> Result<()> {
    while let Some(chunk) = queue.next().await.context("Audio capture failed")? {
        backend
            .send_audio_chunk(&chunk)
            .await
            .context("Failed to stream audio chunk")?;
    }
    debug!("Audio stream ended");
    Ok(())
}

/// Drain backend events, normalize them and fan each one out to the sinks.
async fn consume_transcripts(
    backend: Arc<dyn StreamingBackend>,
    state: Arc<Mutex<PipelineState>>,
    transcript_log: Arc<TranscriptLog>,
    caption: Arc<CaptionPublisher>,
    notifier: Arc<Notifier>,
    display: Option<Arc<DisplayServer>>,
) -> Result<()> {
    while let Some(raw) = backend
        .next_event()
        .await
        .context("Backend event stream failed")?
    {
        let event = TranscriptEvent {
            text: normalize(&raw.text),
            ..raw
        };
        if event.text.is_empty() {
            continue;
        }

        if event.is_final {
            info!("Final: {}", event.text);
            transcript_log.log_final(&event.text);
            if let Some(display) = &display {
                display
                    .broadcast(CaptionMessage::final_text(
                        event.text.clone(),
                        event.speaker.clone(),
                    ))
                    .await;
            }
            notifier.send(&event.text).await;
        } else {
            debug!("Partial: {}", event.text);
            if let Some(display) = &display {
                display
                    .broadcast(CaptionMessage::partial(
                        event.text.clone(),
                        event.speaker.clone(),
                    ))
                    .await;
            }
        }

        let caption_text = state.lock().add_result(&event);
        if let Some(text) = caption_text {
            caption.post(&text).await;
        }
    }

    info!("Transcript stream ended");
    Ok(())
}
