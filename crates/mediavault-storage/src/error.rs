use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no chunk set found for {file_id}")]
    MissingChunks { file_id: String },

    #[error("stream error while chunking: {0}")]
    Stream(String),

    #[error("cancelled")]
    Cancelled,
}

pub type StorageResult<T> = Result<T, StorageError>;
