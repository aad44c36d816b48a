//! Vocaption daemon entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vocaption_audio::AudioCapture;
use vocaption_daemon::{create_backend, Pipeline, Settings};

#[derive(Parser)]
#[command(
    name = "vocaption-daemon",
    about = "Realtime microphone captioning daemon",
    version
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address of the remote transcription engine (host:port)
    #[arg(long)]
    backend_addr: Option<String>,

    /// Caption POST URL for this meeting
    #[arg(long)]
    caption_url: Option<String>,

    /// Write finalized transcripts to this file
    #[arg(long)]
    transcript_log: Option<PathBuf>,

    /// Audio input device index (see --list-devices)
    #[arg(long)]
    device: Option<usize>,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log filter (e.g. info, debug, vocaption_daemon=trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    if cli.list_devices {
        for device in AudioCapture::list_devices()? {
            let marker = if device.is_default { " (default)" } else { "" };
            println!(
                "[{}] {}{} ({} ch, {} Hz)",
                device.index, device.name, marker, device.channels, device.default_sample_rate
            );
        }
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(addr) = cli.backend_addr {
        settings.backend.remote_addr = addr;
    }
    if let Some(url) = cli.caption_url {
        settings.caption.post_url = Some(url);
    }
    if let Some(path) = cli.transcript_log {
        settings.transcript_log.enabled = true;
        settings.transcript_log.file_path = Some(path);
    }
    if let Some(index) = cli.device {
        settings.audio.device_index = Some(index);
    }

    let backend = create_backend(&settings);
    let pipeline = Arc::new(Pipeline::new(settings, backend)?);

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            shutdown.request_stop();
        }
    });

    pipeline.run().await
}
