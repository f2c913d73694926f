use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Backend/network failure reported by the query gateway. Recovered
    /// internally by advancing the fallback tier; never surfaced from the
    /// fetch façade.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A raw row could not be mapped to a canonical point. Logged and the
    /// row dropped; never fatal.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Malformed retrieval request (e.g. zero lookback). Fatal, surfaced.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Even placeholder generation could not proceed. Fatal, surfaced.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
