use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("conversation {0} is already awaiting a completion")]
    Busy(String),

    #[error("conversation {0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("completion response contained no choices")]
    EmptyResponse,
}

impl From<redis::RedisError> for ChatError {
    fn from(err: redis::RedisError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Storage(format!("serialization failed: {}", err))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("principal '{0}' already exists")]
    AlreadyExists(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}
