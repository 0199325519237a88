use thiserror::Error;

/// Result type for provider calls.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by data providers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Credential or token failure, including 401/403 responses.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Network or API failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether this is a credential failure.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
