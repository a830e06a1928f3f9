//! # Subtitle Fetcher
//!
//! Looks for an existing caption track before anyone spends minutes running
//! the speech-recognition engine.
//!
//! ## Selection Policy:
//! 1. preferred language, manually authored track
//! 2. preferred language, automatically generated track
//! 3. fallback language, manual
//! 4. fallback language, automatic
//!
//! A manual track matches a language code exactly, or as the primary subtag
//! of a regional/script variant (`zh` matches `zh-TW` and `zh-Hant`).
//! Automatic tracks must match exactly (or as `{lang}-orig`) and must not be
//! machine translations (`tlang=` in the format URL).
//!
//! "No track in either language" is `SubtitleLookup::NotFound`, a normal
//! outcome. Only tool or network trouble becomes `AppError::FetchError`.

use crate::error::{AppError, AppResult};
use crate::storage::ScratchStore;
use crate::video::vtt::vtt_to_text;
use crate::video::ytdlp::YtDlp;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Languages to look for, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreference {
    pub preferred: String,
    pub fallback: String,
}

impl LanguagePreference {
    pub fn new(preferred: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            preferred: preferred.into(),
            fallback: fallback.into(),
        }
    }

    fn in_order(&self) -> [&str; 2] {
        [&self.preferred, &self.fallback]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionKind {
    Manual,
    Automatic,
}

/// A caption track chosen from the video's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    /// Track key exactly as the source reports it (e.g. "zh-TW").
    pub key: String,
    /// The requested language code this track satisfied.
    pub language: String,
    pub kind: CaptionKind,
}

/// Plain-text subtitles for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitles {
    pub video_id: String,
    pub track: CaptionTrack,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleLookup {
    Found(Subtitles),
    NotFound,
}

#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        languages: &LanguagePreference,
        scratch: &ScratchStore,
    ) -> AppResult<SubtitleLookup>;
}

/// The subset of yt-dlp's `--dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    #[serde(default)]
    subtitles: Option<HashMap<String, Vec<serde_json::Value>>>,
    #[serde(default)]
    automatic_captions: Option<HashMap<String, Vec<serde_json::Value>>>,
}

impl VideoMetadata {
    /// Every usable track in selection-policy order.
    pub fn candidate_tracks(&self, languages: &LanguagePreference) -> Vec<CaptionTrack> {
        let mut tracks = Vec::new();
        for language in languages.in_order() {
            let sources = [
                (CaptionKind::Manual, &self.subtitles),
                (CaptionKind::Automatic, &self.automatic_captions),
            ];
            for (kind, source) in sources {
                let Some(tracks_by_key) = source else { continue };
                let matched = match kind {
                    CaptionKind::Manual => match_language(tracks_by_key, language),
                    CaptionKind::Automatic => match_asr_language(tracks_by_key, language),
                };
                if let Some(key) = matched {
                    let track = CaptionTrack {
                        key,
                        language: language.to_string(),
                        kind,
                    };
                    if !tracks.contains(&track) {
                        tracks.push(track);
                    }
                }
            }
        }
        tracks
    }
}

fn match_language(tracks: &HashMap<String, Vec<serde_json::Value>>, language: &str) -> Option<String> {
    let usable = |key: &String| tracks.get(key).is_some_and(|formats| !formats.is_empty());

    let exact = language.to_string();
    if usable(&exact) {
        return Some(exact);
    }

    let prefix = format!("{}-", language);
    let mut variants: Vec<&String> = tracks
        .keys()
        .filter(|key| key.starts_with(&prefix) && usable(*key))
        .collect();
    variants.sort();
    variants.first().map(|key| key.to_string())
}

fn match_asr_language(tracks: &HashMap<String, Vec<serde_json::Value>>, language: &str) -> Option<String> {
    [language.to_string(), format!("{}-orig", language)]
        .into_iter()
        .find(|key| {
            tracks
                .get(key)
                .is_some_and(|formats| !formats.is_empty() && !is_translation(formats))
        })
}

fn is_translation(formats: &[serde_json::Value]) -> bool {
    formats
        .iter()
        .filter_map(|format| format.get("url").and_then(|url| url.as_str()))
        .any(|url| url.contains("tlang="))
}

/// Subtitle fetcher backed by yt-dlp.
pub struct YtDlpSubtitleFetcher {
    ytdlp: YtDlp,
}

impl YtDlpSubtitleFetcher {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    async fn metadata(&self, url: &str) -> AppResult<VideoMetadata> {
        let output = self
            .ytdlp
            .run(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings", url])
            .await
            .map_err(|e| AppError::FetchError(e.to_string()))?;

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::FetchError(format!("could not parse video metadata: {}", e)))
    }

    /// Download one track as VTT into a scratch directory and return its text.
    /// `Ok(None)` means yt-dlp produced no usable file for this track.
    async fn download_track(
        &self,
        url: &str,
        video_id: &str,
        track: &CaptionTrack,
        scratch: &ScratchStore,
    ) -> AppResult<Option<String>> {
        let dir = scratch
            .acquire_dir("subs")
            .map_err(|e| AppError::Internal(format!("could not create scratch directory: {}", e)))?;

        let write_flag = match track.kind {
            CaptionKind::Manual => "--write-subs",
            CaptionKind::Automatic => "--write-auto-subs",
        };
        let template = dir.path().join("%(id)s");

        let args: [&OsStr; 11] = [
            OsStr::new("--skip-download"),
            OsStr::new(write_flag),
            OsStr::new("--sub-langs"),
            OsStr::new(&track.key),
            OsStr::new("--sub-format"),
            OsStr::new("vtt"),
            OsStr::new("--no-playlist"),
            OsStr::new("--no-warnings"),
            OsStr::new("-o"),
            template.as_os_str(),
            OsStr::new(url),
        ];
        self.ytdlp
            .run(args)
            .await
            .map_err(|e| AppError::FetchError(e.to_string()))?;

        let text = match find_caption_file(dir.path(), video_id, &track.key) {
            Some(path) => {
                let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    AppError::FetchError(format!("could not read {}: {}", path.display(), e))
                })?;
                Some(vtt_to_text(&raw))
            }
            None => {
                debug!(video_id, track = %track.key, "yt-dlp wrote no caption file");
                None
            }
        };

        if let Err(e) = dir.release() {
            warn!(error = %e, "Failed to remove subtitle scratch directory");
        }

        Ok(text.filter(|t| !t.trim().is_empty()))
    }
}

fn find_caption_file(dir: &Path, video_id: &str, key: &str) -> Option<PathBuf> {
    let expected = dir.join(format!("{}.{}.vtt", video_id, key));
    if expected.is_file() {
        return Some(expected);
    }

    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("vtt"))
}

#[async_trait]
impl SubtitleFetcher for YtDlpSubtitleFetcher {
    async fn fetch(
        &self,
        url: &str,
        languages: &LanguagePreference,
        scratch: &ScratchStore,
    ) -> AppResult<SubtitleLookup> {
        let metadata = self.metadata(url).await?;
        let candidates = metadata.candidate_tracks(languages);

        if candidates.is_empty() {
            info!(video_id = %metadata.id, "No subtitles in preferred or fallback language");
            return Ok(SubtitleLookup::NotFound);
        }

        for track in candidates {
            debug!(video_id = %metadata.id, track = %track.key, kind = ?track.kind, "Trying caption track");
            if let Some(text) = self.download_track(url, &metadata.id, &track, scratch).await? {
                info!(
                    video_id = %metadata.id,
                    track = %track.key,
                    kind = ?track.kind,
                    chars = text.chars().count(),
                    "Using existing subtitles"
                );
                return Ok(SubtitleLookup::Found(Subtitles {
                    video_id: metadata.id,
                    track,
                    text,
                }));
            }
        }

        info!(video_id = %metadata.id, "Caption tracks listed but none could be retrieved");
        Ok(SubtitleLookup::NotFound)
    }
}
