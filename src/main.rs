//! # Notes Transcribe Backend - Main Application Entry Point
//!
//! Actix-web server that turns lecture recordings and video links into text
//! and reorganizes that text into study notes.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, `config.toml`, `APP_*` env vars)
//! - **storage**: Per-request scratch files that clean themselves up
//! - **video**: yt-dlp subtitle lookup and audio download
//! - **transcription**: Audio decoding and local Whisper inference
//! - **analysis**: OpenRouter chat-completion client and analysis modes
//! - **pipeline**: Subtitles-first sequencing for the transcription endpoints
//! - **handlers / health / middleware**: HTTP surface, monitoring and request logging

mod analysis;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod state;
mod storage;
mod transcription;
mod video;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use analysis::OpenRouterClient;
use anyhow::{Context, Result};
use config::AppConfig;
use pipeline::TranscriptionPipeline;
use state::AppState;
use std::sync::Arc;
use storage::ScratchStore;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{ModelSize, WhisperModel, WhisperTranscriber};
use video::{LanguagePreference, YtDlp, YtDlpAudioAcquirer, YtDlpSubtitleFetcher};

#[actix_web::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting notes-transcribe-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    if config.analysis.api_key.is_empty() {
        warn!("OPENROUTER_API_KEY is not set; analysis endpoints will fail until it is configured");
    }

    let pipeline = build_pipeline(&config).await?;
    let analyzer = Arc::new(OpenRouterClient::new(&config.analysis)?);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let form_limit = config.max_form_bytes();
    let app_state = web::Data::new(AppState::new(config, pipeline, analyzer));

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure_routes(form_limit))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signals: {}", e);
            }
            info!("Shutdown signal received, stopping server...");
            // In-flight requests finish and release their scratch files
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire the yt-dlp components, the Whisper engine and the scratch store.
///
/// The model is loaded and validated here so a broken install fails at
/// startup rather than on the first request.
async fn build_pipeline(config: &AppConfig) -> Result<TranscriptionPipeline> {
    let scratch = ScratchStore::init(&config.storage.scratch_dir).with_context(|| {
        format!(
            "failed to create scratch directory {}",
            config.storage.scratch_dir.display()
        )
    })?;

    let device = device::select_device(&config.models.device);
    let size: ModelSize = config
        .models
        .whisper_model
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid whisper model '{}': {}", config.models.whisper_model, e))?;
    let model = WhisperModel::load(size, device, &config.models.mel_filters_repo).await?;
    let recognizer = WhisperTranscriber::new(
        Arc::new(model),
        config.performance.max_concurrent_transcriptions,
    );

    let ytdlp = YtDlp::new(&config.video.ytdlp_binary, config.video.timeout());
    let subtitles = YtDlpSubtitleFetcher::new(ytdlp.clone());
    let audio = YtDlpAudioAcquirer::new(ytdlp, &config.video.audio_format);
    let languages = LanguagePreference::new(
        &config.video.preferred_language,
        &config.video.fallback_language,
    );

    Ok(TranscriptionPipeline::new(
        scratch,
        Arc::new(subtitles),
        Arc::new(audio),
        Arc::new(recognizer),
        languages,
    ))
}

/// Structured console logging; `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_transcribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT");
            result
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
