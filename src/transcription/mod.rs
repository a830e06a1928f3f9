//! # Transcription Module
//!
//! Speech-to-text with Whisper models via the Candle-rs framework.
//! Pure Rust: no FFI bindings to whisper.cpp, no Python runtime.
//!
//! ## Key Components:
//! - **decoder**: audio file → 16kHz mono PCM (symphonia + rubato)
//! - **model**: Whisper checkpoint loading and greedy decoding
//! - **engine**: `SpeechRecognizer` seam, blocking-pool execution, result shape
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, good balance for development
//! - **small**: ~244MB, default, handles Mandarin reasonably
//! - **medium**: ~769MB, better accuracy
//! - **large**: ~1550MB, best accuracy but slowest

pub mod decoder;
pub mod engine;
pub mod model;

pub use engine::{SpeechRecognizer, TranscriptSource, TranscriptionResult, WhisperTranscriber};
pub use model::{ModelSize, WhisperModel};
