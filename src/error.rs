use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("microphone unavailable: {0}")]
    Permission(String),

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cache error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not signed in")]
    Unauthenticated,
}

/// Input rejected before anything is sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("phone number must have {expected} digits, got {actual}")]
    PhoneLength { expected: usize, actual: usize },

    #[error("code must have {expected} digits")]
    OtpLength { expected: usize },

    #[error("message is empty")]
    EmptyMessage,

    #[error("file is too large ({size} bytes, limit {limit})")]
    AttachmentTooLarge { size: u64, limit: u64 },

    #[error("invalid server URL: {0}")]
    BaseUrl(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the request never produced an HTTP response.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(e) if e.status().is_none())
    }
}
