#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the hearth package orchestrator
//!
//! This crate provides the data model shared by the install pipeline, the
//! durable store and the daemon: the per-package install state, the on-disk
//! package layout and the reports produced by best-effort steps.

pub mod package;
pub mod paths;
pub mod reports;
pub mod state;

// Re-export commonly used types
pub use package::{
    validate_batch, DistributedFile, FileUploads, PackageInstallState, PackageMetadata,
};
pub use paths::PackagePaths;
pub use reports::{
    CleanupReport, CleanupStep, RollbackReport, RollbackStep, StepOutcome, StepReport,
};
pub use semver::Version;
pub use state::InstalledMetadata;
