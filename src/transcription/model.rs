//! # Whisper Model Management
//!
//! Loads a Whisper checkpoint with Candle-rs and runs greedy decoding on PCM.
//!
//! ## Model Loading Process:
//! 1. Download config, tokenizer and weights from HuggingFace (cached locally)
//! 2. Download the precomputed mel filter bank
//! 3. Initialize model weights on the selected device (CPU/GPU)
//! 4. Validate the model with one second of silence
//!
//! ## Sharing:
//! The loaded model is never mutated. Each transcription clones the candle
//! model (tensors are reference counted, so this is cheap) and decodes with
//! its own KV cache, so concurrent requests need no lock.

use crate::transcription::decoder::{decode_file_to_pcm, TARGET_SAMPLE_RATE};
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::path::Path;
use tokenizers::Tokenizer;

/// Upper bound on generated tokens per 30 second window.
const MAX_TOKENS_PER_WINDOW: usize = 224;

/// Available Whisper model sizes.
///
/// ## Trade-offs:
/// - **Size vs Accuracy**: Larger models are more accurate but slower
/// - **Memory vs Speed**: More memory usage for better performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Special token ids resolved from the tokenizer once at load time.
#[derive(Debug, Clone, Copy)]
struct SpecialTokens {
    sot: u32,
    transcribe: u32,
    no_timestamps: u32,
    eot: u32,
}

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
    tokens: SpecialTokens,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Load a Whisper model and its mel filter bank from HuggingFace.
    ///
    /// `mel_filters_repo` must hold a `melfilters.bytes` file (little-endian
    /// f32, `num_mel_bins * (N_FFT / 2 + 1)` values).
    pub async fn load(size: ModelSize, device: Device, mel_filters_repo: &str) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = build_hub_api()?;

        let repo = api.model(size.repo_name().to_string());
        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let mel_filename = api
            .model(mel_filters_repo.to_string())
            .get("melfilters.bytes")
            .await
            .map_err(|e| anyhow!("Failed to download mel filters from {}: {}", mel_filters_repo, e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        tracing::debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let tokens = SpecialTokens {
            sot: token_id(&tokenizer, m::SOT_TOKEN)?,
            transcribe: token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?,
            no_timestamps: token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
            eot: token_id(&tokenizer, m::EOT_TOKEN)?,
        };

        let mel_filters = read_mel_filters(&std::fs::read(mel_filename)?, &config)?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        let whisper_model = Self {
            model,
            config,
            device,
            size,
            tokenizer,
            tokens,
            mel_filters,
        };
        whisper_model.validate()?;

        Ok(whisper_model)
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Decode the audio file at `path` and transcribe it.
    ///
    /// Blocking and CPU/GPU heavy: call from a blocking worker thread.
    pub fn transcribe_file(&self, path: &Path, language: Option<&str>) -> Result<String> {
        let pcm = decode_file_to_pcm(path)?;
        self.transcribe_pcm(&pcm, language)
    }

    /// Transcribe 16kHz mono PCM, forcing `language` when the tokenizer knows it.
    pub fn transcribe_pcm(&self, pcm: &[f32], language: Option<&str>) -> Result<String> {
        if pcm.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }
        let start_time = std::time::Instant::now();

        let mut prompt = vec![self.tokens.sot];
        if let Some(lang) = language {
            match self.tokenizer.token_to_id(&format!("<|{}|>", lang.to_lowercase())) {
                Some(lang_token) => prompt.push(lang_token),
                None => tracing::warn!(language = lang, "Unknown language hint, decoding without it"),
            }
        }
        prompt.push(self.tokens.transcribe);
        prompt.push(self.tokens.no_timestamps);

        let mut model = self.model.clone();
        let mut text = String::new();

        for (i, window) in pcm.chunks(m::N_SAMPLES).enumerate() {
            let mut samples = window.to_vec();
            samples.resize(m::N_SAMPLES, 0.0);

            let mel = m::audio::pcm_to_mel(&self.config, &samples, &self.mel_filters);
            let n_mels = self.config.num_mel_bins;
            let n_frames = mel.len() / n_mels;
            let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?;

            let output_tokens = self.decode_window(&mut model, &mel, &prompt)?;
            let segment = self
                .tokenizer
                .decode(&output_tokens, true)
                .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
            tracing::debug!(window = i, tokens = output_tokens.len(), "Decoded audio window");
            text.push_str(&segment);
        }

        let text = text.trim().to_string();
        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s ({} chars)",
            pcm.len() as f64 / TARGET_SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            text.chars().count()
        );

        Ok(text)
    }

    /// Greedy decoding of one 30 second window.
    fn decode_window(&self, model: &mut m::model::Whisper, mel: &Tensor, prompt: &[u32]) -> Result<Vec<u32>> {
        let audio_features = model.encoder.forward(mel, true)?;

        let mut tokens = prompt.to_vec();
        let mut output_tokens = Vec::new();

        for step in 0..MAX_TOKENS_PER_WINDOW {
            let token_tensor = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let decoder_output = model.decoder.forward(&token_tensor, &audio_features, step == 0)?;
            let logits = model.decoder.final_linear(&decoder_output.squeeze(0)?)?;

            let seq_len = logits.dim(0)?;
            let next_token = logits.get(seq_len - 1)?.argmax(0)?.to_scalar::<u32>()?;

            if next_token == self.tokens.eot {
                break;
            }
            if is_repetitive(&output_tokens, next_token) {
                tracing::debug!("Repetition loop detected, ending window early");
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        model.reset_kv_cache();
        Ok(output_tokens)
    }

    /// Run one second of silence through the model.
    fn validate(&self) -> Result<()> {
        tracing::debug!("Validating Whisper model...");
        let result = self.transcribe_pcm(&vec![0.0f32; TARGET_SAMPLE_RATE as usize], Some("en"))?;
        tracing::debug!("Model validation successful, test result: '{}'", result);
        Ok(())
    }
}

/// hf-hub client configured from `HF_TOKEN`, `HF_HUB_CACHE` / `HF_HOME`.
fn build_hub_api() -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        tracing::debug!("Using HF token (length: {})", token.len());
        builder = builder.with_token(Some(token));
    }

    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(cache_dir.into());
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(std::path::PathBuf::from(hf_home).join("hub"));
    }

    match builder.build() {
        Ok(api) => Ok(api),
        Err(e) => {
            tracing::error!("ApiBuilder failed: {}, trying fallback to Api::new()", e);
            Api::new().map_err(|e2| {
                anyhow!("HuggingFace API initialization failed: {} (fallback: {})", e, e2)
            })
        }
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("token not found: {}", token))
}

fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(anyhow!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Check if token sequence is stuck in a loop.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() < 6 {
        return false;
    }

    // same token four times in a row
    if tokens[tokens.len() - 3..] == [new_token, new_token, new_token] {
        return true;
    }

    // repeated 3-token pattern
    let last_3 = &tokens[tokens.len() - 3..];
    let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
    last_3 == prev_3
}
