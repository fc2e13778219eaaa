//! External transcoder invocation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mediavault_core::HlsOptions;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{HlsError, HlsResult};

/// File-in / file-out transcoding contract.
///
/// Implementations receive an assembled source file, an output
/// directory and a run-scoped id, and must produce
/// `hls_{run_id}.m3u8` plus `hls_seg_{run_id}_{NNN}.ts` segment files
/// in that directory, returning the playlist path.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// # Errors
    ///
    /// [`HlsError::ToolUnavailable`] when the binary is missing,
    /// [`HlsError::ToolFailed`] on a non-zero exit or missing output,
    /// [`HlsError::ToolTimeout`] when the run exceeds its limit.
    async fn transcode(&self, input: &Path, out_dir: &Path, run_id: &str) -> HlsResult<PathBuf>;
}

/// Drives the `ffmpeg` binary.
pub struct FfmpegTranscoder {
    options: HlsOptions,
}

impl FfmpegTranscoder {
    pub fn new(options: HlsOptions) -> Self {
        Self { options }
    }

    fn playlist_path(out_dir: &Path, run_id: &str) -> PathBuf {
        out_dir.join(format!("hls_{run_id}.m3u8"))
    }

    fn build_args(&self, input: &Path, out_dir: &Path, run_id: &str) -> Vec<String> {
        let playlist = Self::playlist_path(out_dir, run_id);
        let segment_pattern = out_dir.join(format!("hls_seg_{run_id}_%03d.ts"));
        vec![
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-hls_time".into(),
            self.options.segment_time.to_string(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            segment_pattern.to_string_lossy().into_owned(),
            "-f".into(),
            "hls".into(),
            playlist.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, out_dir: &Path, run_id: &str) -> HlsResult<PathBuf> {
        let args = self.build_args(input, out_dir, run_id);
        debug!(bin = %self.options.ffmpeg_bin.display(), ?args, "invoking transcoder");

        let mut command = Command::new(&self.options.ffmpeg_bin);
        command.args(&args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.options.transcode_timeout, command.output())
            .await
        {
            Err(_) => {
                warn!(run_id, "transcoder timed out");
                return Err(HlsError::ToolTimeout {
                    seconds: self.options.transcode_timeout.as_secs(),
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HlsError::ToolUnavailable);
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Keep the tail; ffmpeg puts the actual failure last.
            let tail: String = stderr
                .chars()
                .rev()
                .take(500)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(HlsError::ToolFailed {
                status: output.status.code(),
                detail: tail,
            });
        }

        let playlist = Self::playlist_path(out_dir, run_id);
        if !playlist.is_file() {
            return Err(HlsError::ToolFailed {
                status: output.status.code(),
                detail: "transcoder exited cleanly but produced no playlist".to_string(),
            });
        }
        Ok(playlist)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn options() -> HlsOptions {
        HlsOptions {
            segment_time: 10,
            ..HlsOptions::default()
        }
    }

    #[test]
    fn args_carry_segmenting_flags() {
        let transcoder = FfmpegTranscoder::new(options());
        let args = transcoder.build_args(
            Path::new("/tmp/input.mp4"),
            Path::new("/data/HLS"),
            "run-1234",
        );

        let joined = args.join(" ");
        assert!(joined.contains("-hls_time 10"));
        assert!(joined.contains("-hls_list_size 0"));
        assert!(joined.contains("hls_seg_run-1234_%03d.ts"));
        assert!(joined.ends_with("hls_run-1234.m3u8"));
        assert_eq!(args[0], "-i");
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let transcoder = FfmpegTranscoder::new(HlsOptions {
            ffmpeg_bin: PathBuf::from("mediavault-no-such-transcoder"),
            transcode_timeout: Duration::from_secs(5),
            ..options()
        });

        let result = transcoder.transcode(&input, dir.path(), "run").await;
        assert!(matches!(result, Err(HlsError::ToolUnavailable)));
    }
}
