//! Error types for sessions, storage and submission.
//!
//! Storage errors are defined here rather than in `proctor-store` so the
//! submission coordinator can classify collaborator failures without
//! depending on any concrete store.

use thiserror::Error;

/// Errors raised while loading a test and starting an attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The test code does not resolve to a definition.
    #[error("test definition not found: {0}")]
    DefinitionNotFound(String),

    /// The definition resolved but contains no questions.
    #[error("test {0} has no questions")]
    EmptyQuestionSet(String),

    /// The definition provider itself failed.
    #[error("failed to load test definition: {0}")]
    Store(#[from] StoreError),
}

/// Failures of a definition provider or report sink.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A different summary is already stored under this key.
    #[error("a different result is already stored under {key}")]
    Conflict { key: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode stored data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored definition could not be parsed.
    #[error("invalid test definition: {0}")]
    InvalidDefinition(String),
}

impl StoreError {
    /// Returns `true` if a retry with the same payload may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

/// Errors raised while scoring a frozen snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("snapshot has {answers} answers but the test has {questions} questions")]
    LengthMismatch { questions: usize, answers: usize },
}

/// Errors surfaced from `Attempt::submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The result was computed but could not be saved. Retryable.
    #[error("could not save result {key}, please retry: {source}")]
    PersistenceFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

impl SubmitError {
    /// Whether calling `submit` again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::PersistenceFailure { .. })
    }
}
