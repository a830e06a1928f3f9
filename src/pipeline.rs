//! # Transcription Pipeline
//!
//! Sequences the components for the two transcription endpoints.
//!
//! ## Video source:
//! ```text
//! FETCH_SUBTITLES ─ found ──────────────────────────────▶ done (subtitles)
//!        │ not found
//!        ▼
//! DOWNLOAD_AUDIO ─ error ───────────────────────────────▶ DownloadError
//!        │
//!        ▼
//! TRANSCRIBE ─ ok ─▶ done (whisper) / failed ─▶ TranscriptionFailure
//! ```
//!
//! ## Upload:
//! ```text
//! VALIDATE_EXTENSION ─ bad ─▶ ValidationError (nothing acquired)
//!        │
//!        ▼
//! STORE ─▶ TRANSCRIBE ─ ok / failed
//! ```
//!
//! Every scratch resource acquired on a path is released before the
//! pipeline returns, on success and on failure.

use crate::error::{AppError, AppResult};
use crate::storage::{ScratchResource, ScratchStore};
use crate::transcription::{SpeechRecognizer, TranscriptSource, TranscriptionResult};
use crate::video::{AudioAcquirer, DownloadedAudio, LanguagePreference, SubtitleFetcher, SubtitleLookup};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Upload extensions the engine accepts.
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".mp3", ".wav", ".m4a"];

pub struct TranscriptionPipeline {
    scratch: ScratchStore,
    subtitles: Arc<dyn SubtitleFetcher>,
    audio: Arc<dyn AudioAcquirer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    languages: LanguagePreference,
}

impl TranscriptionPipeline {
    pub fn new(
        scratch: ScratchStore,
        subtitles: Arc<dyn SubtitleFetcher>,
        audio: Arc<dyn AudioAcquirer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        languages: LanguagePreference,
    ) -> Self {
        Self {
            scratch,
            subtitles,
            audio,
            recognizer,
            languages,
        }
    }

    pub fn scratch(&self) -> &ScratchStore {
        &self.scratch
    }

    /// Device the engine runs on, reported as `device_used`.
    pub fn device_label(&self) -> &str {
        self.recognizer.device_label()
    }

    pub fn model_label(&self) -> &str {
        self.recognizer.model_label()
    }

    /// Transcribe an uploaded audio file.
    pub async fn transcribe_upload(&self, filename: &str, bytes: &[u8]) -> AppResult<TranscriptionResult> {
        let extension = allowed_extension(filename).ok_or_else(|| {
            AppError::ValidationError(
                "Unsupported file format. Only .mp3, .wav, .m4a are allowed.".to_string(),
            )
        })?;

        let file = self
            .scratch
            .acquire_file(&extension)
            .map_err(|e| AppError::Internal(format!("could not create scratch file: {}", e)))?;
        if let Err(e) = tokio::fs::write(file.path(), bytes).await {
            return Err(AppError::Internal(format!("could not store upload: {}", e)));
        }

        info!(filename, bytes = bytes.len(), "Transcribing uploaded file");
        let result = self.recognizer.transcribe(file.path(), &self.languages.preferred).await;
        release(file);

        into_app_result(result)
    }

    /// Transcribe a video: reuse its subtitles when they exist, otherwise
    /// download the audio and run the engine.
    pub async fn transcribe_video(&self, url: &str) -> AppResult<TranscriptionResult> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::ValidationError("No YouTube URL provided".to_string()));
        }

        match self.subtitles.fetch(url, &self.languages, &self.scratch).await? {
            SubtitleLookup::Found(subtitles) => {
                return Ok(TranscriptionResult::ok(
                    subtitles.text,
                    subtitles.track.key,
                    TranscriptSource::Subtitles,
                ));
            }
            SubtitleLookup::NotFound => {
                info!(%url, "No subtitles found, falling back to audio transcription");
            }
        }

        let audio = self.audio.acquire(url, &self.scratch).await?;
        let result = self.recognizer.transcribe(audio.path(), &self.languages.preferred).await;
        release_audio(audio);

        into_app_result(result)
    }
}

/// The lowercased extension (with dot) when it is one we accept.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))?;
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

fn into_app_result(result: TranscriptionResult) -> AppResult<TranscriptionResult> {
    if result.success {
        return Ok(result);
    }
    Err(AppError::TranscriptionFailure(
        result.error.unwrap_or_else(|| "unknown engine error".to_string()),
    ))
}

fn release(resource: ScratchResource) {
    let path = resource.path().to_path_buf();
    if let Err(e) = resource.release() {
        warn!(path = %path.display(), error = %e, "Failed to release scratch file");
    }
}

fn release_audio(audio: DownloadedAudio) {
    let path = audio.path().to_path_buf();
    if let Err(e) = audio.release() {
        warn!(path = %path.display(), error = %e, "Failed to release downloaded audio");
    }
}
