//! Container runtime driver errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors raised while driving the container runtime
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeError {
    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("process execution failed: {command} - {message}")]
    ProcessExecutionFailed { command: String, message: String },

    #[error("compose {action} failed for {compose_path}: {message}")]
    ComposeFailed {
        action: String,
        compose_path: String,
        message: String,
    },

    #[error("image load failed for {path}: {message}")]
    ImageLoadFailed { path: String, message: String },

    #[error("image operation failed on {reference}: {message}")]
    ImageOperationFailed { reference: String, message: String },

    #[error("container {container} operation failed: {message}")]
    ContainerOperationFailed { container: String, message: String },

    #[error("unexpected runtime output: {message}")]
    UnexpectedOutput { message: String },

    #[error("invalid compose file {path}: {message}")]
    InvalidCompose { path: String, message: String },
}

impl UserFacingError for RuntimeError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotFound { .. } => {
                Some("Install the docker CLI or set runtime.docker_binary in the configuration.")
            }
            Self::ComposeFailed { .. } | Self::ContainerOperationFailed { .. } => {
                Some("Inspect the container logs with `docker logs` for details.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::ProcessExecutionFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::CommandNotFound { .. } => "runtime.command_not_found",
            Self::ProcessExecutionFailed { .. } => "runtime.process_failed",
            Self::ComposeFailed { .. } => "runtime.compose_failed",
            Self::ImageLoadFailed { .. } => "runtime.image_load_failed",
            Self::ImageOperationFailed { .. } => "runtime.image_operation_failed",
            Self::ContainerOperationFailed { .. } => "runtime.container_operation_failed",
            Self::UnexpectedOutput { .. } => "runtime.unexpected_output",
            Self::InvalidCompose { .. } => "runtime.invalid_compose",
        };
        Some(code)
    }
}
