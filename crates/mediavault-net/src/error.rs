use thiserror::Error;

/// Classified acquisition failures.
///
/// The variant decides the retry policy: see [`FetchError::is_retryable`]
/// and [`FetchError::needs_session_reset`].
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server error {status} for {url}")]
    Server { status: u16, url: String },

    #[error("authorization challenge (403) for {url}")]
    AuthChallenge { url: String },

    #[error("client error {status} for {url}")]
    ClientRejected { status: u16, url: String },

    #[error("invalid payload: {0}")]
    PayloadInvalid(String),

    #[error("request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Build the classified error for a non-success HTTP status.
    pub fn from_status(status: u16, url: &url::Url) -> Self {
        match status {
            403 => Self::AuthChallenge {
                url: url.to_string(),
            },
            400..=499 => Self::ClientRejected {
                status,
                url: url.to_string(),
            },
            _ => Self::Server {
                status,
                url: url.to_string(),
            },
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Timeouts, connection failures and 5xx responses are transient.
    /// A 403 is retryable only after the session has been recreated.
    /// Other 4xx responses and undecodable payloads are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::Server { .. } | Self::AuthChallenge { .. } => {
                true
            }
            Self::ClientRejected { .. } | Self::PayloadInvalid(_) | Self::RetryExhausted { .. } => {
                false
            }
        }
    }

    /// Whether the HTTP session must be recreated before retrying.
    pub fn needs_session_reset(&self) -> bool {
        matches!(self, Self::AuthChallenge { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = error.status() {
            let url = error
                .url()
                .map(ToString::to_string)
                .unwrap_or_default();
            return match status.as_u16() {
                403 => Self::AuthChallenge { url },
                s @ 400..=499 => Self::ClientRejected { status: s, url },
                s => Self::Server { status: s, url },
            };
        }
        Self::Connection(error.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
