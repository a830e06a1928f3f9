//! # Analysis Handlers
//!
//! ## Available Endpoints:
//! - `POST /ai/analyze` - form `transcription`, optional `prompt` / `mode`; defaults to the note template
//! - `POST /analyze/analyze` - same form; defaults to the summary template
//!
//! A non-blank `prompt` is sent as-is and overrides `mode`.
//! Failures answer `500 {"detail": "<transport message>"}`.

use crate::analysis::{AnalysisMode, AnalysisResult, Instruction};
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnalyzeForm {
    pub transcription: Option<String>,
    pub prompt: Option<String>,
    pub mode: Option<String>,
}

/// ## Endpoint: `POST /ai/analyze`
pub async fn ai_analyze(
    state: web::Data<AppState>,
    form: web::Form<AnalyzeForm>,
) -> Result<HttpResponse, AppError> {
    analyze(&state, form.into_inner(), AnalysisMode::Default).await
}

/// ## Endpoint: `POST /analyze/analyze`
pub async fn mode_analyze(
    state: web::Data<AppState>,
    form: web::Form<AnalyzeForm>,
) -> Result<HttpResponse, AppError> {
    analyze(&state, form.into_inner(), AnalysisMode::Summary).await
}

async fn analyze(
    state: &AppState,
    form: AnalyzeForm,
    default_mode: AnalysisMode,
) -> Result<HttpResponse, AppError> {
    let transcription = form
        .transcription
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("No transcription provided".to_string()))?;

    let instruction = Instruction::resolve(form.prompt.as_deref(), form.mode.as_deref(), default_mode);
    match &instruction {
        Instruction::Mode(mode) => tracing::info!(?mode, "Analyzing transcription"),
        Instruction::Custom(_) => tracing::info!("Analyzing transcription with custom prompt"),
    }

    let analysis = state.analyzer.analyze(&transcription, &instruction).await?;

    Ok(HttpResponse::Ok().json(AnalysisResult::ok(analysis)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{StubAudio, StubRecognizer, StubSubtitles};
    use crate::state::tests::{test_state, StubAnalyzer};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    macro_rules! app {
        ($analyzer:expr) => {{
            let (state, stubs) = test_state(
                StubSubtitles::not_found(),
                StubAudio::ok(),
                StubRecognizer::ok("x"),
                $analyzer,
            );
            let form_limit = state.config.max_form_bytes();
            let app = test::init_service(
                App::new()
                    .app_data(web::Data::new(state))
                    .configure(crate::handlers::configure_routes(form_limit)),
            )
            .await;
            (app, stubs)
        }};
    }

    #[actix_web::test]
    async fn test_ai_analyze_defaults_to_note_template() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (app, _stubs) = app!(analyzer.clone());

        let req = test::TestRequest::post()
            .uri("/ai/analyze")
            .set_form([("transcription", "T")])
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["analysis"], "請整理這段文字為筆記，提取重點。 :: T");
        assert!(body.get("error").is_none());
        assert_eq!(
            *analyzer.last_instruction.lock().unwrap(),
            Some(Instruction::Mode(AnalysisMode::Default))
        );
    }

    #[actix_web::test]
    async fn test_mode_analyze_defaults_to_summary_and_honours_mode() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (app, _stubs) = app!(analyzer.clone());

        let req = test::TestRequest::post()
            .uri("/analyze/analyze")
            .set_form([("transcription", "T")])
            .to_request();
        test::call_service(&app, req).await;
        assert_eq!(
            *analyzer.last_instruction.lock().unwrap(),
            Some(Instruction::Mode(AnalysisMode::Summary))
        );

        let req = test::TestRequest::post()
            .uri("/analyze/analyze")
            .set_form([("transcription", "T"), ("mode", "考試模式")])
            .to_request();
        test::call_service(&app, req).await;
        assert_eq!(
            *analyzer.last_instruction.lock().unwrap(),
            Some(Instruction::Mode(AnalysisMode::Exam))
        );
    }

    #[actix_web::test]
    async fn test_custom_prompt_is_forwarded() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (app, _stubs) = app!(analyzer.clone());

        let req = test::TestRequest::post()
            .uri("/ai/analyze")
            .set_form([("transcription", "T"), ("prompt", "請翻譯成英文"), ("mode", "report")])
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["analysis"], "請翻譯成英文 :: T");
    }

    #[actix_web::test]
    async fn test_remote_failure_is_500_with_exact_detail() {
        let analyzer = Arc::new(StubAnalyzer::failing(AppError::AnalysisError(
            "HTTP 500 Internal Server Error: upstream exploded".to_string(),
        )));
        let (app, _stubs) = app!(analyzer);

        let req = test::TestRequest::post()
            .uri("/ai/analyze")
            .set_form([("transcription", "T")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "HTTP 500 Internal Server Error: upstream exploded");
    }

    #[actix_web::test]
    async fn test_long_transcription_is_accepted() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (app, _stubs) = app!(analyzer.clone());

        // well past the 16 KiB default once url-encoded
        let transcription = "今天我們來談談".repeat(300);
        let req = test::TestRequest::post()
            .uri("/ai/analyze")
            .set_form([("transcription", transcription.as_str())])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["analysis"].as_str().unwrap().ends_with(&transcription));
    }

    #[actix_web::test]
    async fn test_form_over_configured_limit_is_400() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (state, _stubs) = test_state(
            StubSubtitles::not_found(),
            StubAudio::ok(),
            StubRecognizer::ok("x"),
            analyzer.clone(),
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(crate::handlers::configure_routes(1024)),
        )
        .await;

        let transcription = "今天我們來談談".repeat(300);
        let req = test::TestRequest::post()
            .uri("/analyze/analyze")
            .set_form([("transcription", transcription.as_str())])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_missing_transcription_is_400_without_remote_call() {
        let analyzer = Arc::new(StubAnalyzer::ok());
        let (app, _stubs) = app!(analyzer.clone());

        let req = test::TestRequest::post()
            .uri("/ai/analyze")
            .set_form([("transcription", "   ")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }
}
