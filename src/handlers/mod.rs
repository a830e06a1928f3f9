//! # HTTP Handlers
//!
//! Route table for the whole service. `main` and the handler tests both
//! build their `App` through [`configure_routes`].

pub mod analyze;
pub mod transcribe;

use crate::error::AppError;
use crate::health;
use actix_web::web;

/// Route table with url-encoded form bodies capped at `form_limit` bytes
/// (`server.max_form_kb`; analysis forms carry whole transcripts).
pub fn configure_routes(form_limit: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(
            web::FormConfig::default()
                .limit(form_limit)
                .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
        )
        .route("/transcribe", web::post().to(transcribe::transcribe_upload))
        .route("/transcribe/youtube", web::post().to(transcribe::transcribe_youtube))
        .route("/ai/analyze", web::post().to(analyze::ai_analyze))
        .route("/analyze/analyze", web::post().to(analyze::mode_analyze))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics)),
        );
    }
}
