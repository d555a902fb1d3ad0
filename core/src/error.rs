use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("User not authenticated")]
    Unauthenticated,

    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("Remote read failed: {0}")]
    RemoteReadFailed(String),
}

impl Error {
    /// Whether re-issuing the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RemoteWriteFailed(_) | Error::RemoteReadFailed(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
