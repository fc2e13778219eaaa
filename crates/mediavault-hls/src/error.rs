use thiserror::Error;

#[derive(Debug, Error)]
pub enum HlsError {
    #[error("transcoder binary not found")]
    ToolUnavailable,

    #[error("transcoder failed (exit {status:?}): {detail}")]
    ToolFailed {
        status: Option<i32>,
        detail: String,
    },

    #[error("transcoder timed out after {seconds}s")]
    ToolTimeout { seconds: u64 },

    #[error("source chunk missing: {0}")]
    MissingSource(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("cipher error: {0}")]
    Cipher(#[from] mediavault_cipher::CipherError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HlsResult<T> = Result<T, HlsError>;
