use std::path::PathBuf;

use crate::recording::RecordingState;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: RecordingState,
    },

    #[error("No recording session to splice")]
    NoSession,

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

impl RecorderError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn invalid_state(action: &'static str, state: RecordingState) -> Self {
        Self::InvalidState { action, state }
    }

    #[cfg(test)]
    pub(crate) fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
