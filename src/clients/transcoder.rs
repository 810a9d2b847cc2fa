use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

/// Extracts the audio track of a video into a local file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn video_to_audio(&self, source_url: &str, dest: &Path, deadline: Duration)
    -> Result<()>;
}

/// Shells out to `ffmpeg`, copying the audio stream without re-encoding.
pub struct FfmpegTranscoder;

impl FfmpegTranscoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn video_to_audio(
        &self,
        source_url: &str,
        dest: &Path,
        deadline: Duration,
    ) -> Result<()> {
        info!(dest = %dest.display(), "extracting audio track");

        let mut command = Command::new("ffmpeg");
        command
            .args(["-y", "-i", source_url, "-vn", "-acodec", "copy"])
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(deadline, command.output()).await {
            Ok(output) => output.context("failed to spawn ffmpeg")?,
            Err(_) => bail!("audio extraction timed out after {deadline:?}"),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            tail.reverse();
            bail!("ffmpeg exited with {}: {}", output.status, tail.join(" | "));
        }
        Ok(())
    }
}
