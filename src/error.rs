use std::process::ExitStatus;

use thiserror::Error;

use crate::analysis::purpose::FieldPurpose;

/// Errors surfaced by the analysis and resolution pipeline.
///
/// Only `PageUnavailable` and `ElementNotFound` ever reach the orchestrator.
/// `ClassificationService` and `SchemaViolation` are recovered inside the
/// external classifier adapter; `Driver` errors are translated by the resolver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Page unavailable: {0}")]
    PageUnavailable(String),

    #[error("Classification service error: {0}")]
    ClassificationService(String),

    #[error("Classifier response violated schema: {0}")]
    SchemaViolation(String),

    #[error("No element found for purpose '{0}'")]
    ElementNotFound(FieldPurpose),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Errors raised by a `PageDriver` implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Node.js subprocess failed to spawn (browser_server.js)
    #[error("Failed to spawn {script} (is Node.js installed?): {source}")]
    SubprocessSpawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// Node.js subprocess exited with non-zero status
    #[error("{script} exited with {status}: {stderr}")]
    SubprocessFailed {
        script: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Session I/O error: {0}")]
    SessionIO(String),

    #[error("Browser command '{command}' failed: {error}")]
    SessionProtocol { command: String, error: String },

    #[error("JSON parse error ({context}): {source}")]
    JsonParse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialize error ({context}): {source}")]
    JsonSerialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The element handle no longer refers to an attached node.
    #[error("Stale element handle: {0}")]
    StaleElement(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl DriverError {
    /// Whether the same operation is worth one more attempt.
    pub fn is_stale(&self) -> bool {
        matches!(self, DriverError::StaleElement(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
