//! # Analysis
//!
//! Sends transcribed text to a remote chat-completion API together with a
//! mode-selected instruction and returns the model's reply.
//! One request, one response: no streaming and no retries.

pub mod client;
pub mod mode;

pub use client::{OpenRouterClient, TextAnalyzer};
pub use mode::{AnalysisMode, Instruction};

use serde::Serialize;

/// Response body of the analysis endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn ok(analysis: impl Into<String>) -> Self {
        Self {
            success: true,
            analysis: analysis.into(),
            error: None,
        }
    }
}
