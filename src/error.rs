// src/error.rs

use thiserror::Error;

/// The log export could not be understood. Never retried.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("commit header on line {line} does not have four fields: '{header}'")]
    MalformedHeader { line: usize, header: String },

    #[error("commit timestamp on line {line} is not a valid epoch: '{value}'")]
    BadTimestamp { line: usize, value: String },
}

#[derive(Error, Debug)]
pub enum MiningError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("{operation} failed for {repository}: {source:#}")]
    ExternalTool {
        operation: String,
        repository: String,
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MiningError {
    pub fn tool(operation: impl Into<String>, repository: impl ToString, source: anyhow::Error) -> Self {
        MiningError::ExternalTool {
            operation: operation.into(),
            repository: repository.to_string(),
            source,
        }
    }

    /// Format and configuration errors stop the whole run, everything else
    /// only stops the repository it happened in.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, MiningError::Format(_) | MiningError::Configuration(_))
    }
}
