//! Tunables shared across the workspace.
//!
//! Every constant the pipelines depend on (timeouts, retry counts,
//! chunk sizing, transcode settings) lives here so callers can
//! construct non-default values instead of editing constants. Defaults
//! match the values the system has always shipped with.

use std::{path::PathBuf, time::Duration};

/// HTTP acquisition settings.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum retry attempts per fetch before the item is reported failed.
    pub max_retries: u32,
    /// Base delay for exponential backoff (`base * 2^(attempt-1)`).
    pub base_delay: Duration,
    /// Hard cap on a single backoff delay.
    pub max_delay: Duration,
    /// Fixed delay between successive page fetches, applied regardless
    /// of outcome to stay under rate limits.
    pub page_delay: Duration,
    /// Optional proxy URL for outbound requests.
    pub proxy: Option<String>,
    /// Optional User-Agent override.
    pub user_agent: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            page_delay: Duration::from_secs(1),
            proxy: None,
            user_agent: None,
        }
    }
}

/// Chunk sizing policy for sequential chunked writes.
#[derive(Clone, Copy, Debug)]
pub struct ChunkPolicy {
    /// Payloads with a known size below this are split into
    /// `chunk_count_small` pieces.
    pub small_threshold: u64,
    /// Piece count for small payloads.
    pub chunk_count_small: u64,
    /// Fixed chunk size for large or unknown-size payloads.
    pub chunk_size_large: usize,
    /// Read increment when consuming a byte stream.
    pub read_increment: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            small_threshold: 1024 * 1024,
            chunk_count_small: 3,
            chunk_size_large: 1024 * 1024,
            read_increment: 8192,
        }
    }
}

impl ChunkPolicy {
    /// Target chunk size for a payload of (possibly unknown) total size.
    ///
    /// Known size below the threshold: split into `chunk_count_small`
    /// pieces of `ceil(size / chunk_count_small)` bytes. Unknown size or
    /// size at/above the threshold: the fixed large chunk size. Never
    /// returns zero, so a zero-length payload still produces one
    /// (empty) chunk.
    pub fn chunk_size_for(&self, total_size: Option<u64>) -> usize {
        match total_size {
            Some(size) if size < self.small_threshold => {
                let per_piece = size.div_ceil(self.chunk_count_small);
                (per_piece.max(1)) as usize
            }
            _ => self.chunk_size_large,
        }
    }
}

/// External-transcoder settings for HLS derivation.
#[derive(Clone, Debug)]
pub struct HlsOptions {
    /// Transcoder binary to invoke.
    pub ffmpeg_bin: PathBuf,
    /// Target segment duration in seconds.
    pub segment_time: u32,
    /// Wall-clock limit for one transcode run.
    pub transcode_timeout: Duration,
    /// Endpoint prefix substituted for local key-delivery URIs when a
    /// manifest is rewritten.
    pub key_uri_prefix: String,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            segment_time: 10,
            transcode_timeout: Duration::from_secs(3600),
            key_uri_prefix: "/api/hls/key/".to_string(),
        }
    }
}

/// Top-level configuration: storage root and the obfuscation secret.
#[derive(Clone, Debug)]
pub struct VaultConfig {
    /// Root directory for date-partitioned media storage.
    pub media_root: PathBuf,
    /// Secret the obfuscation key is derived from.
    pub secret: String,
    pub download: DownloadOptions,
    pub chunks: ChunkPolicy,
    pub hls: HlsOptions,
}

impl VaultConfig {
    /// Build a config for `media_root` and `secret`, defaults elsewhere.
    pub fn new(media_root: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        Self {
            media_root: media_root.into(),
            secret: secret.into(),
            download: DownloadOptions::default(),
            chunks: ChunkPolicy::default(),
            hls: HlsOptions::default(),
        }
    }

    /// Apply `MEDIAVAULT_MEDIA_ROOT` / `MEDIAVAULT_SECRET` environment
    /// overrides, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("MEDIAVAULT_MEDIA_ROOT") {
            if !root.is_empty() {
                self.media_root = PathBuf::from(root);
            }
        }
        if let Ok(secret) = std::env::var("MEDIAVAULT_SECRET") {
            if !secret.is_empty() {
                self.secret = secret;
            }
        }
        self
    }
}
