//! # Error Handling
//!
//! Every failure a request can run into is one variant of [`AppError`]. Handlers
//! return `Result<HttpResponse, AppError>` and actix converts the error into a
//! JSON response through the [`ResponseError`] implementation below.
//!
//! ## Taxonomy:
//! - **ValidationError**: the caller sent something unusable (400)
//! - **FetchError**: the video source could not be queried for subtitles (500)
//! - **DownloadError**: the audio stream could not be downloaded/transcoded (500)
//! - **TranscriptionFailure**: the speech-recognition engine failed (500)
//! - **AnalysisError**: the remote text-generation service failed (500)
//! - **ConfigError / Internal**: server-side problems (500)
//!
//! "No subtitles available" is deliberately absent: it is a normal outcome
//! (`SubtitleLookup::NotFound`), never an error.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::ValidationError("No YouTube URL provided".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Bad input shape: unsupported extension, missing field, oversized upload
    ValidationError(String),

    /// Network or tool failure while looking up subtitles
    FetchError(String),

    /// Network, unsupported-source or transcode failure while downloading audio
    DownloadError(String),

    /// The recognition engine could not produce a transcript
    TranscriptionFailure(String),

    /// Transport, authentication or quota failure from the remote model API
    AnalysisError(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Anything else that went wrong on our side
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::FetchError(msg) => write!(f, "Failed to fetch subtitles: {}", msg),
            AppError::DownloadError(msg) => write!(f, "Failed to download audio: {}", msg),
            AppError::TranscriptionFailure(msg) => write!(f, "Transcription failed: {}", msg),
            AppError::AnalysisError(msg) => write!(f, "Analysis failed: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into the JSON payloads the clients of this service expect.
///
/// ## Response Shapes:
/// - Validation failures: `{"success": false, "error": "..."}` with 400
/// - External-system failures: `{"success": false, "error": "...", "details": "..."}`
///   where `details` is the underlying message
/// - Analysis failures: `{"detail": "..."}`, the shape the analysis
///   endpoints have always used
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::ValidationError(msg) => json!({
                "success": false,
                "error": msg,
            }),
            AppError::FetchError(msg) => json!({
                "success": false,
                "error": "Failed to fetch subtitles",
                "details": msg,
            }),
            AppError::DownloadError(msg) => json!({
                "success": false,
                "error": "Failed to download audio",
                "details": msg,
            }),
            AppError::TranscriptionFailure(msg) => json!({
                "success": false,
                "error": "Transcription failed",
                "details": msg,
            }),
            AppError::AnalysisError(msg) => json!({
                "detail": msg,
            }),
            AppError::ConfigError(msg) | AppError::Internal(msg) => json!({
                "success": false,
                "error": msg,
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// When you use `?` with an anyhow::Error inside a handler it becomes an
/// `AppError::Internal`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_validation_error_is_bad_request() {
        let (status, body) =
            body_json(AppError::ValidationError("Unsupported file format".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unsupported file format");
    }

    #[actix_web::test]
    async fn test_external_failures_carry_details() {
        let (status, body) =
            body_json(AppError::TranscriptionFailure("decoder: out of memory".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Transcription failed");
        assert_eq!(body["details"], "decoder: out of memory");

        let (_, body) = body_json(AppError::DownloadError("HTTP Error 403".to_string())).await;
        assert_eq!(body["error"], "Failed to download audio");
        assert_eq!(body["details"], "HTTP Error 403");
    }

    #[actix_web::test]
    async fn test_analysis_error_uses_detail_field() {
        let (status, body) = body_json(AppError::AnalysisError("HTTP 401".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "detail": "HTTP 401" }));
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::FetchError("timed out after 300s".to_string());
        assert_eq!(err.to_string(), "Failed to fetch subtitles: timed out after 300s");
    }
}
