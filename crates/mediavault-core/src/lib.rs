#![forbid(unsafe_code)]

pub mod config;
pub mod hash;

pub use config::{ChunkPolicy, DownloadOptions, HlsOptions, VaultConfig};
pub use hash::{content_hash, is_content_hash};
