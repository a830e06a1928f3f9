//! # Transcription Engine
//!
//! The `SpeechRecognizer` seam between the request pipeline and the Whisper
//! model, plus the result shape shared by the subtitle and engine paths.
//!
//! ## Key Responsibilities:
//! - **Off-loop execution**: decoding runs on tokio's blocking pool
//! - **Back-pressure**: at most `max_concurrent` decodes run at once
//! - **Failure shaping**: engine errors become `success=false` results, never panics

use crate::device::device_label;
use crate::transcription::model::WhisperModel;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Where a transcript came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Subtitles,
    #[serde(rename = "whisper")]
    Engine,
}

/// Result of a transcription attempt.
///
/// Exactly one of `text` (success) or `error` (failure) carries content;
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptionResult {
    pub success: bool,
    pub text: String,
    pub language: String,
    pub source: TranscriptSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResult {
    pub fn ok(text: impl Into<String>, language: impl Into<String>, source: TranscriptSource) -> Self {
        Self {
            success: true,
            text: text.into(),
            language: language.into(),
            source,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, language: impl Into<String>, source: TranscriptSource) -> Self {
        Self {
            success: false,
            text: String::new(),
            language: language.into(),
            source,
            error: Some(error.into()),
        }
    }
}

/// Speech-to-text over a local audio file.
///
/// Implementations only read `path`; deleting it is the caller's job.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, path: &Path, language: &str) -> TranscriptionResult;

    /// Compute device label reported as `device_used`.
    fn device_label(&self) -> &str;

    /// Loaded model, as reported by the health endpoint.
    fn model_label(&self) -> &str;
}

/// `SpeechRecognizer` backed by the process-wide Whisper model.
pub struct WhisperTranscriber {
    model: Arc<WhisperModel>,
    permits: Arc<Semaphore>,
    device_label: &'static str,
    model_label: String,
}

impl WhisperTranscriber {
    pub fn new(model: Arc<WhisperModel>, max_concurrent: usize) -> Self {
        let device_label = device_label(model.device());
        let model_label = model.size().to_string();
        Self {
            model,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            device_label,
            model_label,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperTranscriber {
    async fn transcribe(&self, path: &Path, language: &str) -> TranscriptionResult {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return TranscriptionResult::failed(e.to_string(), language, TranscriptSource::Engine),
        };

        let model = Arc::clone(&self.model);
        let path: PathBuf = path.to_path_buf();
        let lang = language.to_string();
        let start_time = Instant::now();

        tracing::info!(path = %path.display(), language, "Running Whisper transcription");

        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.transcribe_file(&path, Some(&lang))
        })
        .await;

        match outcome {
            Ok(Ok(text)) => {
                tracing::info!(
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    chars = text.chars().count(),
                    "Whisper transcription finished"
                );
                TranscriptionResult::ok(text, language, TranscriptSource::Engine)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Whisper transcription failed");
                TranscriptionResult::failed(e.to_string(), language, TranscriptSource::Engine)
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "Transcription worker panicked");
                TranscriptionResult::failed(
                    format!("transcription worker failed: {}", join_error),
                    language,
                    TranscriptSource::Engine,
                )
            }
        }
    }

    fn device_label(&self) -> &str {
        self.device_label
    }

    fn model_label(&self) -> &str {
        &self.model_label
    }
}
