use thiserror::Error;

/// Errors raised by voice assignment and timeline composition.
///
/// Both are surfaced to the caller immediately and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Insufficient input: {0}")]
    InsufficientInput(String),
}

impl CoreError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        CoreError::Configuration(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        CoreError::InsufficientInput(msg.into())
    }
}
