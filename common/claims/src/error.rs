use thiserror::Error;

pub type ClaimsResult<T> = Result<T, ClaimsError>;

/// Failure reported by the identity provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("identity '{0}' not found")]
    NotFound(String),
    #[error("identity provider rejected the request: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("identity provider transport failure: {0}")]
    Transport(String),
    #[error("malformed identity provider response: {0}")]
    Decode(String),
}

/// Failure reported by the document database.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("document store rejected the write: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("document store transport failure: {0}")]
    Transport(String),
    #[error("unsupported field value for '{0}'")]
    UnsupportedValue(String),
}

#[derive(Debug, Clone, Error)]
pub enum ClaimsError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("identity id '{0}' is not a valid document id")]
    InvalidIdentityId(String),
}

/// A role string outside the closed set of staff roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown staff role '{0}'")]
pub struct UnknownRole(pub String);

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
