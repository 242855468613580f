pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Attempt(#[from] AttemptError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Failure reported by a persistence gateway call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PersistenceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            PersistenceError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            PersistenceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Decode(err.to_string())
    }
}

/// User-facing classification of a failed attempt operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("Could not open the test: {0}")]
    Initialization(PersistenceError),

    #[error("Autosave failed: {0}")]
    Autosave(PersistenceError),

    #[error("Submission failed: {0}")]
    Submission(PersistenceError),
}

impl AttemptError {
    pub fn source_error(&self) -> &PersistenceError {
        match self {
            AttemptError::Initialization(err)
            | AttemptError::Autosave(err)
            | AttemptError::Submission(err) => err,
        }
    }
}
