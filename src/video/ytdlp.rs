//! Thin async wrapper around the yt-dlp executable.
//!
//! Arguments are passed with `.arg()` (no shell), every run is bounded by a
//! timeout, and the child is killed if the timeout fires.

use std::ffi::OsStr;
use std::fmt;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// stderr from yt-dlp can be long; keep error messages readable.
const MAX_STDERR_CHARS: usize = 1000;

#[derive(Debug)]
pub enum YtDlpError {
    /// The binary could not be started (usually: not installed).
    Spawn(std::io::Error),
    /// The run exceeded the configured timeout and was killed.
    TimedOut(Duration),
    /// yt-dlp exited unsuccessfully.
    Failed { status: ExitStatus, stderr: String },
    /// yt-dlp succeeded but printed something we could not use.
    UnexpectedOutput(String),
}

impl fmt::Display for YtDlpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YtDlpError::Spawn(e) => write!(f, "could not run yt-dlp: {}", e),
            YtDlpError::TimedOut(limit) => {
                write!(f, "yt-dlp timed out after {}s", limit.as_secs())
            }
            YtDlpError::Failed { status, stderr } => {
                write!(f, "yt-dlp exited with {}: {}", status, stderr)
            }
            YtDlpError::UnexpectedOutput(msg) => write!(f, "unexpected yt-dlp output: {}", msg),
        }
    }
}

impl std::error::Error for YtDlpError {}

/// Configured yt-dlp invocation. Cheap to clone.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Run yt-dlp with `args` and return its captured output on success.
    pub async fn run<I, S>(&self, args: I) -> Result<Output, YtDlpError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(binary = %self.binary, timeout_secs = self.timeout.as_secs(), "Running yt-dlp");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(YtDlpError::Spawn)?,
            Err(_) => return Err(YtDlpError::TimedOut(self.timeout)),
        };

        if !output.status.success() {
            return Err(YtDlpError::Failed {
                status: output.status,
                stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        Ok(output)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_STDERR_CHARS).collect()
}
