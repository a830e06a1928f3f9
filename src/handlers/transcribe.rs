//! # Transcription Handlers
//!
//! ## Available Endpoints:
//! - `POST /transcribe` - multipart upload (field `file`, or `audio`)
//! - `POST /transcribe/youtube` - form field `url`; subtitles first, engine second
//!
//! ## Success Response:
//! ```json
//! {
//!   "success": true,
//!   "transcription": "大家好，今天我們來談談 Rust",
//!   "language": "zh",
//!   "device_used": "cuda",
//!   "source": "whisper"
//! }
//! ```
//! Subtitle-sourced responses carry `"source": "subtitles"` and no `device_used`.

use crate::error::AppError;
use crate::pipeline::allowed_extension;
use crate::state::AppState;
use crate::transcription::{TranscriptSource, TranscriptionResult};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};

/// Multipart field names accepted for the uploaded audio.
const UPLOAD_FIELDS: [&str; 2] = ["file", "audio"];

#[derive(Debug, Deserialize)]
pub struct YoutubeForm {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub success: bool,
    pub transcription: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_used: Option<String>,
    pub source: TranscriptSource,
}

impl TranscriptionResponse {
    fn from_result(result: TranscriptionResult, device_label: &str) -> Self {
        let device_used = match result.source {
            TranscriptSource::Engine => Some(device_label.to_string()),
            TranscriptSource::Subtitles => None,
        };
        Self {
            success: result.success,
            transcription: result.text,
            language: result.language,
            device_used,
            source: result.source,
        }
    }
}

/// Transcribe an uploaded audio file.
///
/// ## Endpoint: `POST /transcribe`
///
/// ## Errors:
/// - 400 when the file is missing, too large, or not .mp3/.wav/.m4a
/// - 500 `{success:false, error:"Transcription failed", details}` on engine failure
pub async fn transcribe_upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let max_bytes = state.config.max_upload_bytes();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(item) = payload.next().await {
        let field: Field = item.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::ValidationError("Missing content disposition".to_string()))?;
        let field_name = content_disposition.get_name().unwrap_or_default();
        if !UPLOAD_FIELDS.contains(&field_name) || upload.is_some() {
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .map(str::to_string)
            .unwrap_or_default();
        // reject before buffering the body
        if allowed_extension(&filename).is_none() {
            return Err(AppError::ValidationError(
                "Unsupported file format. Only .mp3, .wav, .m4a are allowed.".to_string(),
            ));
        }

        let bytes = read_field(field, max_bytes).await?;
        upload = Some((filename, bytes));
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::ValidationError("No audio file provided".to_string()))?;

    tracing::info!(filename = %filename, bytes = bytes.len(), "Received audio upload");
    let result = state.pipeline.transcribe_upload(&filename, &bytes).await?;

    Ok(HttpResponse::Ok().json(TranscriptionResponse::from_result(
        result,
        state.pipeline.device_label(),
    )))
}

/// Transcribe a video by URL, reusing its subtitles when it has any.
///
/// ## Endpoint: `POST /transcribe/youtube`
pub async fn transcribe_youtube(
    state: web::Data<AppState>,
    form: web::Form<YoutubeForm>,
) -> Result<HttpResponse, AppError> {
    let url = form.into_inner().url.unwrap_or_default();
    let result = state.pipeline.transcribe_video(&url).await?;

    Ok(HttpResponse::Ok().json(TranscriptionResponse::from_result(
        result,
        state.pipeline.device_label(),
    )))
}

async fn read_field(mut field: Field, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::ValidationError(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::ValidationError(format!(
                "File too large (max: {} bytes)",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
