//! Analysis modes and the instruction each one sends to the model.

use serde::Serialize;

/// Caller-selected preset for how transcribed text is reorganized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Bullet-point study notes.
    Exam,
    /// mermaid.js diagram of the content.
    Report,
    Summary,
    #[default]
    Default,
}

impl AnalysisMode {
    /// The fixed instruction template for this mode.
    pub fn template(&self) -> &'static str {
        match self {
            AnalysisMode::Exam => {
                "請以條列式列出這段筆記的重點（Bullet Points），整理出重要知識點與相關概念。"
            }
            AnalysisMode::Report => {
                "請將這段內容整理為 mermaid.js 格式的流程圖、心智圖或資訊結構圖，適合視覺化理解。"
            }
            AnalysisMode::Summary => "請為這段內容撰寫簡潔摘要，涵蓋主要內容。",
            AnalysisMode::Default => "請整理這段文字為筆記，提取重點。",
        }
    }
}

/// Total mapping: unknown labels become `Default` instead of failing.
impl From<&str> for AnalysisMode {
    fn from(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "exam" | "考試模式" => AnalysisMode::Exam,
            "report" | "報告模式" => AnalysisMode::Report,
            "summary" | "摘要" => AnalysisMode::Summary,
            _ => AnalysisMode::Default,
        }
    }
}

/// What the model is asked to do with the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Mode(AnalysisMode),
    /// Caller-supplied instruction text, sent verbatim.
    Custom(String),
}

impl Instruction {
    /// A non-blank `prompt` wins; otherwise `mode` (or `fallback` when absent).
    pub fn resolve(prompt: Option<&str>, mode: Option<&str>, fallback: AnalysisMode) -> Self {
        if let Some(prompt) = prompt.map(str::trim).filter(|p| !p.is_empty()) {
            return Instruction::Custom(prompt.to_string());
        }
        Instruction::Mode(mode.map(AnalysisMode::from).unwrap_or(fallback))
    }

    pub fn text(&self) -> &str {
        match self {
            Instruction::Mode(mode) => mode.template(),
            Instruction::Custom(text) => text,
        }
    }
}
