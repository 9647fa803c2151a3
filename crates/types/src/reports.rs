//! Reports produced by best-effort steps
//!
//! Rollback and cleanup attempt every step for every package and collect the
//! outcomes instead of stopping at the first failure.

use std::fmt;

use hearth_errors::Error;

/// Steps attempted while rolling a package back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollbackStep {
    RestoreCompose,
    RestoreManifest,
    DeleteImage,
    RestartContainers,
    RemoveContainers,
}

impl fmt::Display for RollbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RestoreCompose => "restore_compose",
            Self::RestoreManifest => "restore_manifest",
            Self::DeleteImage => "delete_image",
            Self::RestartContainers => "restart_containers",
            Self::RemoveContainers => "remove_containers",
        };
        f.write_str(name)
    }
}

/// Steps attempted while cleaning up after a successful install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupStep {
    RecordMetadata,
    DeleteBackups,
    DeleteImage,
    DeleteStaleArchives,
    RemoveOldImages,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RecordMetadata => "record_metadata",
            Self::DeleteBackups => "delete_backups",
            Self::DeleteImage => "delete_image",
            Self::DeleteStaleArchives => "delete_stale_archives",
            Self::RemoveOldImages => "remove_old_images",
        };
        f.write_str(name)
    }
}

/// Outcome of one step for one package
#[derive(Debug, Clone)]
pub struct StepOutcome<S> {
    pub package: String,
    pub step: S,
    pub result: Result<(), Error>,
}

/// Collected step outcomes
#[derive(Debug, Clone)]
pub struct StepReport<S> {
    pub outcomes: Vec<StepOutcome<S>>,
}

impl<S> Default for StepReport<S> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<S: Copy + PartialEq> StepReport<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, package: &str, step: S, result: Result<(), Error>) {
        self.outcomes.push(StepOutcome {
            package: package.to_string(),
            step,
            result,
        });
    }

    /// Outcomes that failed
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome<S>> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    /// Whether every attempted step succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Outcome of `step` for `package`, if it was attempted
    #[must_use]
    pub fn outcome(&self, package: &str, step: S) -> Option<&StepOutcome<S>> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.package == package && outcome.step == step)
    }
}

pub type RollbackReport = StepReport<RollbackStep>;
pub type CleanupReport = StepReport<CleanupStep>;
