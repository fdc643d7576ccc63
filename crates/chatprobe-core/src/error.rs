use std::path::PathBuf;

use thiserror::Error;

use crate::platform::PlatformError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] PlatformError),

    #[error("No session available for app {app_id}")]
    SessionUnavailable { app_id: String },

    #[error("Failed to send message: {source}")]
    SendFailed {
        #[source]
        source: PlatformError,
    },

    #[error("Cannot select '{matcher}': no buttons in the last response")]
    NoMatchingOption { matcher: String },

    #[error("Response option not found for select '{matcher}'")]
    OptionNotFound { matcher: String },

    #[error("Prompt generation failed for instruction '{instruction}'")]
    PromptGenerationFailed { instruction: String },

    #[error("Evaluation failed: {reason}")]
    EvaluationFailed { reason: String },

    #[error("Cannot write results to {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Errors raised by a scripted step against the agent, as opposed to
    /// errors of the harness itself.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            Error::NoMatchingOption { .. }
                | Error::OptionNotFound { .. }
                | Error::PromptGenerationFailed { .. }
                | Error::EvaluationFailed { .. }
        )
    }
}
