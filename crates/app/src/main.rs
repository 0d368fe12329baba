use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use roadsense_app::config::AppConfig;
use roadsense_app::loopback;
use roadsense_app::runtime;
use roadsense_app::source::WavSource;
use roadsense_foundation::{AudioError, ShutdownHandler};
use roadsense_relay::{MemoryTransport, RelayEvent, WearableTransport, WsTransport};

#[derive(Parser, Debug)]
#[command(name = "roadsense", about = "Vehicle-sound detection and wearable alert relay")]
struct Cli {
    /// TOML configuration file (signatures, thresholds, relay tuning).
    #[arg(long, env = "ROADSENSE_CONFIG")]
    config: Option<PathBuf>,

    /// WAV file streamed into the pipeline as the audio source.
    #[arg(long)]
    input: PathBuf,

    /// WebSocket URL of the wearable bridge; overrides the config file.
    /// Without one, an in-process loopback wearable acknowledges alerts.
    #[arg(long)]
    server: Option<String>,

    /// Stream the WAV as fast as possible instead of pacing at real time.
    #[arg(long)]
    fast: bool,
}

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "roadsense.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if cli.server.is_some() {
        config.relay.url = cli.server.clone();
    }

    let shutdown = ShutdownHandler::new().install().await;

    let transport: Box<dyn WearableTransport> = match &config.relay.url {
        Some(url) => {
            info!(url = %url, "relaying alerts to wearable bridge");
            Box::new(WsTransport::new(url.clone()))
        }
        None => {
            warn!("no wearable URL configured; using in-process loopback wearable");
            let (transport, harness) = MemoryTransport::pair();
            tokio::spawn(loopback::run(harness));
            Box::new(transport)
        }
    };

    let audio_settings = config.audio.clone();
    let (handle, producer) =
        runtime::start(config, transport).context("starting pipeline")?;

    let mut notices = handle.subscribe_relay_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                RelayEvent::DeliveryFailed {
                    id,
                    signature,
                    reason,
                } => {
                    warn!(id, signature = %signature, ?reason, "alert permanently dropped")
                }
                RelayEvent::SessionState(state) => info!(?state, "wearable session"),
                RelayEvent::AlertDelivered { .. } => {}
            }
        }
    });

    let source = WavSource::spawn(cli.input.clone(), producer, &audio_settings, !cli.fast)?;

    let mut stats_interval = tokio::time::interval(Duration::from_secs(30));
    stats_interval.tick().await; // first tick fires immediately
    let mut reported_dropped = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!("Shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                let m = &handle.metrics;
                let dropped = m.dropped_frames();
                if dropped > reported_dropped {
                    let err = AudioError::CaptureOverrun { dropped: dropped - reported_dropped };
                    warn!(error = %err, "pipeline fell behind the audio source");
                    reported_dropped = dropped;
                }
                info!(
                    frames = m.frames_assembled.load(Ordering::Relaxed),
                    dropped,
                    events = m.events_confirmed.load(Ordering::Relaxed),
                    delivered = m.alerts_delivered.load(Ordering::Relaxed),
                    "pipeline stats"
                );
            }
            _ = tokio::time::sleep(Duration::from_millis(200)), if source.is_finished() => {
                info!("Audio source drained");
                break;
            }
        }
    }

    match source.join() {
        Ok(samples) => info!(samples, "audio source stopped"),
        Err(e) => warn!(error = %e, "audio source failed"),
    }
    handle.shutdown().await?;
    Ok(())
}
