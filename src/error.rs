use crate::extract::NoSqlReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiqlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Could not extract SQL: {0}")]
    Extraction(NoSqlReason),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiqlError {
    /// True for failures where the backend could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AiqlError::BackendUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, AiqlError>;
