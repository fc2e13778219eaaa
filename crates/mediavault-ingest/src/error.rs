use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("declared chunk {name} is missing")]
    MissingChunk { name: String },

    #[error("content hash mismatch: declared {expected}, merged {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("artifact not available: {0}")]
    MissingArtifact(String),

    #[error("storage error: {0}")]
    Storage(#[from] mediavault_storage::StorageError),

    #[error("fetch error: {0}")]
    Fetch(#[from] mediavault_net::FetchError),

    #[error("cipher error: {0}")]
    Cipher(#[from] mediavault_cipher::CipherError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Metadata(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
