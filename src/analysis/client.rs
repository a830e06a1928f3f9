//! Chat-completion client for OpenRouter (or any OpenAI-compatible endpoint).

use crate::analysis::mode::Instruction;
use crate::config::AnalysisConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that organizes text into structured notes.";

/// Text → reorganized text.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, instruction: &Instruction) -> AppResult<String>;
}

pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    site_url: String,
    site_name: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenRouterClient {
    pub fn new(config: &AnalysisConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            site_url: config.site_url.clone(),
            site_name: config.site_name.clone(),
        })
    }

    fn build_messages(instruction: &Instruction, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: Some(SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: Some(format!("{}\n\nText: {}", instruction.text(), text)),
            },
        ]
    }
}

#[async_trait]
impl TextAnalyzer for OpenRouterClient {
    async fn analyze(&self, text: &str, instruction: &Instruction) -> AppResult<String> {
        let request_body = ChatCompletionRequest {
            model: &self.model,
            messages: Self::build_messages(instruction, text),
            max_tokens: self.max_tokens,
        };

        tracing::info!(model = %self.model, chars = text.chars().count(), "Sending analysis request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::AnalysisError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Analysis request rejected by remote API");
            return Err(AppError::AnalysisError(format!("HTTP {}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::AnalysisError(format!("invalid response: {}", e)))?;

        let analysis = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::AnalysisError("empty completion".to_string()))?;

        tracing::info!(chars = analysis.chars().count(), "Analysis completed");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::mode::AnalysisMode;
    use actix_web::{dev::ServerHandle, web, App, HttpRequest, HttpResponse, HttpServer};
    use serde_json::{json, Value};

    async fn echo_completion(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let title = req
            .headers()
            .get("x-title")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        HttpResponse::Ok().json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!(
                        "{}|{}|{}|{}|{}",
                        auth,
                        title,
                        body["max_tokens"],
                        body["messages"][0]["content"].as_str().unwrap_or_default(),
                        body["messages"][1]["content"].as_str().unwrap_or_default(),
                    )
                }
            }]
        }))
    }

    async fn upstream_failure() -> HttpResponse {
        HttpResponse::InternalServerError().body("upstream exploded")
    }

    async fn empty_choices() -> HttpResponse {
        HttpResponse::Ok().json(json!({ "choices": [] }))
    }

    fn start_stub() -> (String, ServerHandle) {
        let server = HttpServer::new(|| {
            App::new()
                .route("/ok/chat/completions", web::post().to(echo_completion))
                .route("/fail/chat/completions", web::post().to(upstream_failure))
                .route("/empty/chat/completions", web::post().to(empty_choices))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}", addr), handle)
    }

    fn client_for(base_url: String) -> OpenRouterClient {
        let mut config = crate::config::AppConfig::default().analysis;
        config.base_url = base_url;
        config.api_key = "test-key".to_string();
        OpenRouterClient::new(&config).unwrap()
    }

    #[actix_web::test]
    async fn test_request_shape_and_reply() {
        let (base, handle) = start_stub();
        let client = client_for(format!("{}/ok/", base));

        let reply = client
            .analyze("T", &Instruction::Mode(AnalysisMode::Default))
            .await
            .unwrap();

        let parts: Vec<&str> = reply.splitn(5, '|').collect();
        assert_eq!(parts[0], "Bearer test-key");
        assert_eq!(parts[1], "Transcription App");
        assert_eq!(parts[2], "1000");
        assert_eq!(parts[3], SYSTEM_PROMPT);
        assert_eq!(parts[4], "請整理這段文字為筆記，提取重點。\n\nText: T");

        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_http_500_is_analysis_error_with_transport_message() {
        let (base, handle) = start_stub();
        let client = client_for(format!("{}/fail", base));

        let err = client
            .analyze("T", &Instruction::Mode(AnalysisMode::Default))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::AnalysisError("HTTP 500 Internal Server Error: upstream exploded".to_string())
        );

        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_empty_choices_is_analysis_error() {
        let (base, handle) = start_stub();
        let client = client_for(format!("{}/empty", base));

        let err = client
            .analyze("T", &Instruction::Custom("x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AnalysisError(ref msg) if msg == "empty completion"));

        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_unreachable_endpoint_is_analysis_error() {
        // port 9 (discard) is closed on test machines
        let client = client_for("http://127.0.0.1:9".to_string());
        let err = client
            .analyze("T", &Instruction::Mode(AnalysisMode::Summary))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AnalysisError(_)));
    }
}
