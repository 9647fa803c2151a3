use serde::{Deserialize, Serialize};

use hearth_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod install;
pub mod notification;
pub mod progress;
pub mod runtime;

pub use general::*;
pub use install::*;
pub use notification::*;
pub use progress::*;
pub use runtime::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Byte-level transfer progress
    Progress(ProgressEvent),

    /// Install pipeline events
    Install(InstallEvent),

    /// Commands run against the container runtime
    Runtime(RuntimeEvent),

    /// Notifications for other subsystems of the appliance
    Notification(NotificationEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Progress(ProgressEvent::Failed { .. })
            | Self::Runtime(RuntimeEvent::ProcessExecutionFailed { .. })
            | Self::Install(InstallEvent::BatchFailed { .. } | InstallEvent::StepFailed { .. }) => {
                Level::ERROR
            }

            Self::General(GeneralEvent::Warning { .. })
            | Self::Install(
                InstallEvent::DownloadOversize { .. }
                | InstallEvent::CoreVerificationFailed { .. },
            ) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Install(
                InstallEvent::DownloadProgress { .. } | InstallEvent::LoadProgress { .. },
            )
            | Self::Runtime(
                RuntimeEvent::ProcessExecutionStarted { .. }
                | RuntimeEvent::ProcessExecutionCompleted { .. },
            ) => Level::DEBUG,

            Self::Runtime(RuntimeEvent::LayerLoaded { .. }) => Level::TRACE,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "hearth::events::general",
            Self::Progress(_) => "hearth::events::progress",
            Self::Install(_) => "hearth::events::install",
            Self::Runtime(_) => "hearth::events::runtime",
            Self::Notification(_) => "hearth::events::notification",
        }
    }

    /// Get structured fields for logging
    #[must_use]
    pub fn log_fields(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
