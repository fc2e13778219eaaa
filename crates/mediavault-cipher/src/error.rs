use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("obfuscation secret must not be empty")]
    EmptySecret,

    #[error("transport decoding failed: {0}")]
    Transport(#[from] base64::DecodeError),
}

pub type CipherResult<T> = Result<T, CipherError>;
