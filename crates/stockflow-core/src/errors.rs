use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Error(String),
    #[error("{element} '{id}': field '{field}' expected a number, got {value}")]
    NonNumeric {
        element: &'static str,
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("Malformed model document: {0}")]
    MalformedDocument(String),
    #[error("Integration failed: {0}")]
    IntegrationFailed(String),
}

/// Convenience type for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
