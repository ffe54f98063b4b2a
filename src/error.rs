//! Error taxonomy for the compliance engine.
//!
//! Definition errors are logged and skipped over by the loader; subject
//! errors abort the check that raised them; solver-unknown is surfaced as
//! data (`CheckStatus::Unknown`), never coerced into a success or failure.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("definition error in {context}: {message}")]
    Definition { context: String, message: String },

    #[error("subject error: {0}")]
    Subject(String),

    #[error("solver returned unknown{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    SolverUnknown { reason: Option<String> },

    #[error("i/o error loading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("glob pattern error in {pattern}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

impl EngineError {
    pub fn definition(context: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Definition {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn subject(message: impl Into<String>) -> Self {
        EngineError::Subject(message.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
