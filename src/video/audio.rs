//! # Audio Acquirer
//!
//! Downloads the best audio-only stream of a video and transcodes it into the
//! configured codec. The result lives in a per-request scratch directory and
//! is named after the video's id (`<id>.mp3`).
//!
//! No retries happen here: any failure is a terminal `AppError::DownloadError`.

use crate::error::{AppError, AppResult};
use crate::storage::{ScratchResource, ScratchStore};
use crate::video::ytdlp::{YtDlp, YtDlpError};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Downloaded audio together with the scratch resource that owns it.
#[derive(Debug)]
pub struct DownloadedAudio {
    path: PathBuf,
    scratch: ScratchResource,
}

impl DownloadedAudio {
    pub fn new(path: PathBuf, scratch: ScratchResource) -> Self {
        Self { path, scratch }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the downloaded audio (and its scratch directory).
    pub fn release(self) -> io::Result<()> {
        self.scratch.release()
    }
}

#[async_trait]
pub trait AudioAcquirer: Send + Sync {
    async fn acquire(&self, url: &str, scratch: &ScratchStore) -> AppResult<DownloadedAudio>;
}

/// Audio acquirer backed by yt-dlp (+ ffmpeg for the transcode step).
pub struct YtDlpAudioAcquirer {
    ytdlp: YtDlp,
    audio_format: String,
}

impl YtDlpAudioAcquirer {
    pub fn new(ytdlp: YtDlp, audio_format: impl Into<String>) -> Self {
        Self {
            ytdlp,
            audio_format: audio_format.into(),
        }
    }
}

#[async_trait]
impl AudioAcquirer for YtDlpAudioAcquirer {
    async fn acquire(&self, url: &str, scratch: &ScratchStore) -> AppResult<DownloadedAudio> {
        let dir = scratch
            .acquire_dir("audio")
            .map_err(|e| AppError::Internal(format!("could not create scratch directory: {}", e)))?;
        let template = dir.path().join("%(id)s.%(ext)s");

        info!(%url, format = %self.audio_format, "Downloading audio stream");

        let args: [&OsStr; 12] = [
            OsStr::new("-f"),
            OsStr::new("bestaudio"),
            OsStr::new("--extract-audio"),
            OsStr::new("--audio-format"),
            OsStr::new(&self.audio_format),
            OsStr::new("--no-playlist"),
            OsStr::new("--no-warnings"),
            OsStr::new("--output"),
            template.as_os_str(),
            OsStr::new("--print"),
            OsStr::new("after_move:filepath"),
            OsStr::new(url),
        ];
        let output = self
            .ytdlp
            .run(args)
            .await
            .map_err(|e| AppError::DownloadError(e.to_string()))?;

        let printed = String::from_utf8_lossy(&output.stdout);
        let path = match printed.lines().map(str::trim).rfind(|line| !line.is_empty()) {
            Some(line) => PathBuf::from(line),
            None => find_audio_file(dir.path(), &self.audio_format).ok_or_else(|| {
                AppError::DownloadError(
                    YtDlpError::UnexpectedOutput("no audio file was produced".to_string()).to_string(),
                )
            })?,
        };

        if !dir.contains(&path) || !path.is_file() {
            return Err(AppError::DownloadError(
                YtDlpError::UnexpectedOutput(format!(
                    "audio path {} is not inside the scratch directory",
                    path.display()
                ))
                .to_string(),
            ));
        }

        info!(path = %path.display(), "Audio stream downloaded");
        Ok(DownloadedAudio::new(path, dir))
    }
}

fn find_audio_file(dir: &Path, extension: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_removes_downloaded_file() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::init(root.path()).unwrap();
        let dir = scratch.acquire_dir("audio").unwrap();
        let path = dir.path().join("abc123.mp3");
        std::fs::write(&path, b"id3").unwrap();

        let audio = DownloadedAudio::new(path.clone(), dir);
        assert_eq!(audio.path(), path.as_path());
        audio.release().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    mod with_fake_ytdlp {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Writes `<template with id=abc123, ext=mp3>` and prints its path.
        const DOWNLOADING_SCRIPT: &str = r#"out=""
prev=""
for a in "$@"; do
  case "$prev" in --output) out="$a" ;; esac
  prev="$a"
done
path=$(printf '%s' "$out" | sed -e 's/%(id)s/abc123/' -e 's/%(ext)s/mp3/')
printf 'fake mp3' > "$path"
echo "$path"
"#;

        #[tokio::test]
        async fn test_acquire_returns_file_keyed_by_video_id() {
            let tools = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let binary = write_script(tools.path(), DOWNLOADING_SCRIPT);
            let acquirer = YtDlpAudioAcquirer::new(
                YtDlp::new(binary.to_string_lossy(), Duration::from_secs(10)),
                "mp3",
            );
            let scratch = ScratchStore::init(root.path()).unwrap();

            let audio = acquirer.acquire("https://youtu.be/abc123", &scratch).await.unwrap();
            assert_eq!(audio.path().file_name().unwrap(), "abc123.mp3");
            assert!(audio.path().is_file());

            audio.release().unwrap();
            assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_failed_download_is_download_error_and_leaves_nothing() {
            let tools = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let binary = write_script(tools.path(), "echo 'ERROR: Video unavailable' >&2\nexit 1\n");
            let acquirer = YtDlpAudioAcquirer::new(
                YtDlp::new(binary.to_string_lossy(), Duration::from_secs(10)),
                "mp3",
            );
            let scratch = ScratchStore::init(root.path()).unwrap();

            let err = acquirer.acquire("https://youtu.be/gone", &scratch).await.unwrap_err();
            match err {
                AppError::DownloadError(msg) => assert!(msg.contains("Video unavailable")),
                other => panic!("unexpected error: {:?}", other),
            }
            assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_slow_download_times_out() {
            let tools = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let binary = write_script(tools.path(), "sleep 5\n");
            let acquirer = YtDlpAudioAcquirer::new(
                YtDlp::new(binary.to_string_lossy(), Duration::from_millis(200)),
                "mp3",
            );
            let scratch = ScratchStore::init(root.path()).unwrap();

            let err = acquirer.acquire("https://youtu.be/slow", &scratch).await.unwrap_err();
            assert!(matches!(err, AppError::DownloadError(ref msg) if msg.contains("timed out")));
        }
    }
}
