//! # Video Sources
//!
//! Everything that talks to a video URL goes through yt-dlp:
//! - **subtitles**: the fast path, reuse captions that already exist
//! - **audio**: the slow path, download audio for the transcription engine
//! - **vtt**: caption payload → plain text
//! - **ytdlp**: process invocation with a timeout

pub mod audio;
pub mod subtitles;
pub mod vtt;
pub mod ytdlp;

pub use audio::{AudioAcquirer, DownloadedAudio, YtDlpAudioAcquirer};
pub use subtitles::{LanguagePreference, SubtitleFetcher, SubtitleLookup, YtDlpSubtitleFetcher};
pub use ytdlp::YtDlp;
