//! # Configuration Management
//!
//! This module handles loading application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with `APP_` prefix and `__` as section separator)
//! - A handful of deployment-style variables (`HOST`, `PORT`, `OPENROUTER_API_KEY`, ...)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`HOST`, `PORT`, `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_ANALYSIS__MODEL`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Configuration is read once at startup. There is no hot reload.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub storage: StorageConfig,
    pub video: VideoConfig,
    pub analysis: AnalysisConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `max_upload_mb`: largest accepted audio upload, in megabytes
/// - `max_form_kb`: largest url-encoded form body (analysis transcripts), in kilobytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
    pub max_form_kb: usize,
}

/// Speech-recognition model settings.
///
/// ## Fields:
/// - `whisper_model`: which Whisper model to load ("tiny", "base", "small", "medium", "large")
/// - `device`: "auto" picks CUDA or Metal when available and falls back to CPU
/// - `mel_filters_repo`: HuggingFace repository holding `melfilters.bytes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub device: String,
    pub mel_filters_repo: String,
}

/// Where per-request scratch files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub scratch_dir: PathBuf,
}

/// Video-source (yt-dlp) settings.
///
/// ## Fields:
/// - `ytdlp_binary`: program name or absolute path of yt-dlp
/// - `preferred_language`: subtitle language tried first and forced on the engine
/// - `fallback_language`: subtitle language tried second
/// - `timeout_secs`: upper bound for any single yt-dlp invocation
/// - `audio_format`: codec yt-dlp transcodes downloaded audio into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub ytdlp_binary: String,
    pub preferred_language: String,
    pub fallback_language: String,
    pub timeout_secs: u64,
    pub audio_format: String,
}

/// Remote chat-completion API settings.
///
/// `api_key` is a secret and must come from the environment
/// (`OPENROUTER_API_KEY` or `APP_ANALYSIS__API_KEY`). It is never logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub site_url: String,
    pub site_name: String,
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("site_url", &self.site_url)
            .field("site_name", &self.site_name)
            .finish()
    }
}

/// Performance tuning configuration.
///
/// `max_concurrent_transcriptions` bounds how many engine runs may occupy the
/// blocking worker pool at once. Extra requests wait for a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_transcriptions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                max_upload_mb: 100,
                max_form_kb: 2048,
            },
            models: ModelsConfig {
                whisper_model: "small".to_string(),
                device: "auto".to_string(),
                mel_filters_repo: "FL33TW00D-HF/whisper-base".to_string(),
            },
            storage: StorageConfig {
                scratch_dir: PathBuf::from("temp_audio"),
            },
            video: VideoConfig {
                ytdlp_binary: "yt-dlp".to_string(),
                preferred_language: "zh".to_string(),
                fallback_language: "en".to_string(),
                timeout_secs: 300,
                audio_format: "mp3".to_string(),
            },
            analysis: AnalysisConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key: String::new(),
                model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
                max_tokens: 1000,
                timeout_secs: 60,
                site_url: "http://localhost:8000".to_string(),
                site_name: "Transcription App".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_transcriptions: 2,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MODELS__WHISPER_MODEL=medium`: Override whisper model
    /// - `APP_STORAGE__SCRATCH_DIR=/var/tmp/notes`: Override scratch root
    /// - `OPENROUTER_API_KEY=sk-...`: Remote API key
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // `__` keeps keys such as `api_key` intact: APP_ANALYSIS__API_KEY
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        let overrides = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("OPENROUTER_API_KEY", "analysis.api_key"),
            ("OPENROUTER_BASE_URL", "analysis.base_url"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// An empty API key is allowed: transcription works without it and
    /// analysis requests surface the remote authentication failure.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.server.max_form_kb == 0 {
            return Err(anyhow::anyhow!("Maximum form size must be greater than 0"));
        }

        if self.performance.max_concurrent_transcriptions == 0 {
            return Err(anyhow::anyhow!("Max concurrent transcriptions must be greater than 0"));
        }

        if self.storage.scratch_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Scratch directory cannot be empty"));
        }

        if self.video.preferred_language.trim().is_empty()
            || self.video.fallback_language.trim().is_empty()
        {
            return Err(anyhow::anyhow!("Subtitle language codes cannot be empty"));
        }

        if self.video.timeout_secs == 0 || self.analysis.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0 seconds"));
        }

        if self.analysis.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Analysis base URL cannot be empty"));
        }

        if self.analysis.max_tokens == 0 {
            return Err(anyhow::anyhow!("Analysis max_tokens must be greater than 0"));
        }

        Ok(())
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }

    pub fn max_form_bytes(&self) -> usize {
        self.server.max_form_kb * 1024
    }
}

impl VideoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
