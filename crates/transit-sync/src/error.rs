use thiserror::Error;

/// Failure talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no user is signed in")]
    SignedOut,
    #[error("auth provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("favorites require a signed-in user")]
    Unauthenticated,
    #[error("station {0:?} is not in the current collection")]
    UnknownStation(String),
}
