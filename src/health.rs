//! # Health Check Endpoints
//!
//! - `GET /health`, `GET /api/v1/health`: liveness plus a summary of what the
//!   service is running with (model, device, scratch dir, request counters)
//! - `GET /api/v1/metrics`: per-endpoint request statistics
//!
//! Both are cheap: no external call, no engine work.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness and configuration summary.
///
/// ## Response Example:
/// ```json
/// {
///   "status": "healthy",
///   "uptime_seconds": 3600,
///   "service": { "name": "notes-transcribe-backend", "version": "0.1.0" },
///   "transcription": { "model": "small", "device": "cpu" },
///   "metrics": { "total_requests": 12, "total_errors": 1 }
/// }
/// ```
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "transcription": {
            "model": state.pipeline.model_label(),
            "device": state.pipeline.device_label(),
            "max_concurrent": config.performance.max_concurrent_transcriptions,
            "scratch_dir": state.pipeline.scratch().root().display().to_string()
        },
        "analysis": {
            "model": config.analysis.model,
            "api_key_configured": !config.analysis.api_key.is_empty()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count
        },
        "memory": get_memory_info()
    }))
}

/// Per-endpoint request statistics.
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats
    }))
}

/// Process memory from /proc (Linux only).
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let read_kb = |prefix: &str| -> u64 {
                status
                    .lines()
                    .find(|line| line.starts_with(prefix))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{StubAudio, StubRecognizer, StubSubtitles};
    use crate::state::tests::{test_state, StubAnalyzer};
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_reports_model_and_device() {
        let (state, _stubs) = test_state(
            StubSubtitles::not_found(),
            StubAudio::ok(),
            StubRecognizer::ok("x"),
            Arc::new(StubAnalyzer::ok()),
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        // the loaded model, not the configured default
        assert_eq!(body["transcription"]["model"], "tiny");
        assert_eq!(body["transcription"]["device"], "cpu");
        assert_eq!(body["analysis"]["api_key_configured"], false);
    }

    #[actix_web::test]
    async fn test_metrics_lists_recorded_endpoints() {
        let (state, _stubs) = test_state(
            StubSubtitles::not_found(),
            StubAudio::ok(),
            StubRecognizer::ok("x"),
            Arc::new(StubAnalyzer::ok()),
        );
        state.record_endpoint_request("/transcribe", 40, false);
        state.record_endpoint_request("/ai/analyze", 10, true);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["overall"]["total_requests"], 2);
        assert_eq!(body["endpoints"][0]["endpoint"], "/ai/analyze");
        assert_eq!(body["endpoints"][1]["average_duration_ms"], 40.0);
    }
}
