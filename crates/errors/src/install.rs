//! Installation pipeline error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstallError {
    #[error("installation failed: {message}")]
    Failed { message: String },

    #[error("no packages specified")]
    NoPackagesSpecified,

    #[error("invalid install state for {package}: {message}")]
    InvalidState { package: String, message: String },

    #[error("batch contains {count} copies of the self package {package}")]
    DuplicateSelfPackage { package: String, count: usize },

    #[error("download failed for {package}: {message}")]
    DownloadFailed { package: String, message: String },

    #[error("verification failed for {package}: {reason}")]
    VerificationFailed { package: String, reason: String },

    #[error("image load failed for {package}: {message}")]
    ImageLoadFailed { package: String, message: String },

    #[error("container activation failed for {package}: {message}")]
    ContainerActivationFailed { package: String, message: String },

    #[error("self restart failed for {package}: {message}")]
    SelfRestartFailed { package: String, message: String },

    /// The helper never came to exist, so nothing settles the batch later
    #[error("self restart of {package} could not start: {message}")]
    SelfRestartNotStarted { package: String, message: String },

    #[error("self restart of {package} returned without replacing the process")]
    SelfRestartReturned { package: String },

    #[error("task execution failed: {message}")]
    TaskError { message: String },
}

impl InstallError {
    /// Whether this error leaves rollback to the restart helper or the next boot
    #[must_use]
    pub fn skips_local_rollback(&self) -> bool {
        matches!(
            self,
            Self::SelfRestartFailed { .. } | Self::SelfRestartReturned { .. }
        )
    }
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DownloadFailed { .. } => {
                Some("Check connectivity to the content gateway and retry the install.")
            }
            Self::VerificationFailed { .. } => {
                Some("The release image is damaged or mislabeled; retry or pick another release.")
            }
            Self::SelfRestartFailed { .. } => Some(
                "The pending update is kept and will be resolved on the next start of the daemon.",
            ),
            Self::SelfRestartNotStarted { .. } => {
                Some("The batch was rolled back; check the restart settings and retry the install.")
            }
            Self::InvalidState { .. } | Self::DuplicateSelfPackage { .. } => {
                Some("Fix the install request; it was rejected before anything changed.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. } | Self::VerificationFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Failed { .. } => "install.failed",
            Self::NoPackagesSpecified => "install.no_packages",
            Self::InvalidState { .. } => "install.invalid_state",
            Self::DuplicateSelfPackage { .. } => "install.duplicate_self_package",
            Self::DownloadFailed { .. } => "install.download_failed",
            Self::VerificationFailed { .. } => "install.verification_failed",
            Self::ImageLoadFailed { .. } => "install.image_load_failed",
            Self::ContainerActivationFailed { .. } => "install.container_activation_failed",
            Self::SelfRestartFailed { .. } => "install.self_restart_failed",
            Self::SelfRestartNotStarted { .. } => "install.self_restart_not_started",
            Self::SelfRestartReturned { .. } => "install.self_restart_returned",
            Self::TaskError { .. } => "install.task_error",
        };
        Some(code)
    }
}
