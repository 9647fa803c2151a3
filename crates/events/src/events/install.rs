//! Install pipeline events

use hearth_types::Version;
use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Stage of the install pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Acquisition,
    ImageActivation,
    ContainerActivation,
    SelfRestart,
    Rollback,
    Cleanup,
}

impl std::fmt::Display for InstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Acquisition => "acquisition",
            Self::ImageActivation => "image_activation",
            Self::ContainerActivation => "container_activation",
            Self::SelfRestart => "self_restart",
            Self::Rollback => "rollback",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a batch install and of its packages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    BatchStarted {
        packages: Vec<String>,
    },

    BatchCompleted {
        packages: Vec<String>,
    },

    BatchFailed {
        packages: Vec<String>,
        failure: FailureContext,
    },

    StageStarted {
        stage: InstallStage,
        packages: Vec<String>,
    },

    StageCompleted {
        stage: InstallStage,
    },

    DownloadProgress {
        package: String,
        percent: u8,
    },

    /// Download exceeded the size announced by the release
    DownloadOversize {
        package: String,
        expected: u64,
        received: u64,
    },

    ImageVerified {
        package: String,
        version: Version,
    },

    /// Verification failed for a core package; the batch continues
    CoreVerificationFailed {
        package: String,
        failure: FailureContext,
    },

    LoadProgress {
        package: String,
        percent: u8,
    },

    ImageLoaded {
        package: String,
    },

    /// Container activation moved a package to a new state
    ContainerStateChanged {
        package: String,
        state: String,
    },

    SelfRestartLaunching {
        package: String,
        script_path: String,
    },

    /// A helper from a previous self restart was found at startup
    PendingRestartFound {
        helper: String,
        exit_code: i64,
        packages: Vec<String>,
    },

    StepFailed {
        stage: InstallStage,
        package: String,
        step: String,
        failure: FailureContext,
    },

    RollbackCompleted {
        packages: Vec<String>,
        failed_steps: usize,
    },

    CleanupCompleted {
        packages: Vec<String>,
        failed_steps: usize,
    },
}
