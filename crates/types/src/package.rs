//! Per-package install state

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hearth_errors::{Error, InstallError};
use serde::{Deserialize, Serialize};

use crate::paths::PackagePaths;
use crate::Version;

/// Files to write into service containers: service name → container path → content
pub type FileUploads = BTreeMap<String, BTreeMap<String, String>>;

/// Descriptor of a content-addressed release artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedFile {
    /// Where the content can be fetched from (URL, `/ipfs/<cid>`, bare hash or `file://` path)
    pub source: String,
    /// Content hash published with the release
    pub hash: String,
    /// Expected size in bytes
    pub size: u64,
}

impl DistributedFile {
    /// Local filesystem path of a `file://` or absolute-path source
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        let path = self.source.strip_prefix("file://").unwrap_or(&self.source);
        path.starts_with('/').then(|| Path::new(path))
    }
}

/// Release metadata that customises the self restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageMetadata {
    /// Replacement for the rendered helper script
    pub restart_command: Option<String>,
    /// Replacement for the helper launch command
    pub restart_launch_command: Option<String>,
}

/// Everything the pipeline needs to install one package
///
/// Serialized in camelCase so a persisted batch stays a stable JSON document
/// across daemon versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallState {
    pub dnp_name: String,
    pub sem_version: Version,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub is_update: bool,
    pub compose_path: PathBuf,
    pub compose_backup_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest_backup_path: PathBuf,
    pub image_file: DistributedFile,
    pub image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_uploads: Option<FileUploads>,
    #[serde(default)]
    pub metadata: PackageMetadata,
}

impl PackageInstallState {
    /// Build a state whose paths follow the standard package layout
    #[must_use]
    pub fn from_layout(
        data_dir: &Path,
        dnp_name: &str,
        sem_version: Version,
        image_file: DistributedFile,
    ) -> Self {
        let paths = PackagePaths::new(data_dir, dnp_name);
        let image_path = paths.image_path(&sem_version);
        Self {
            dnp_name: dnp_name.to_string(),
            sem_version,
            is_core: false,
            is_update: false,
            compose_path: paths.compose,
            compose_backup_path: paths.compose_backup,
            manifest_path: paths.manifest,
            manifest_backup_path: paths.manifest_backup,
            image_file,
            image_path,
            docker_timeout: None,
            file_uploads: None,
            metadata: PackageMetadata::default(),
        }
    }

    /// Image reference the release archive is tagged with
    #[must_use]
    pub fn image_tag(&self) -> String {
        format!("{}:{}", self.dnp_name, self.sem_version)
    }

    /// Whether this state describes the orchestrator's own package
    #[must_use]
    pub fn is_self(&self, self_package_name: &str) -> bool {
        self.dnp_name == self_package_name
    }

    /// Whether the package has uploads to copy into its containers
    #[must_use]
    pub fn has_file_uploads(&self) -> bool {
        self.file_uploads
            .as_ref()
            .is_some_and(|uploads| uploads.values().any(|files| !files.is_empty()))
    }

    /// Check the per-package invariants
    ///
    /// # Errors
    ///
    /// Returns `InstallError::InvalidState` when the image path is empty,
    /// relative or equal to the fetch source, or when an update lacks its
    /// backup files.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| -> Error {
            InstallError::InvalidState {
                package: self.dnp_name.clone(),
                message,
            }
            .into()
        };

        if self.image_path.as_os_str().is_empty() {
            return Err(invalid("image path is empty".to_string()));
        }
        if !self.image_path.is_absolute() {
            return Err(invalid(format!(
                "image path {} is not absolute",
                self.image_path.display()
            )));
        }
        if self.image_file.local_path() == Some(self.image_path.as_path()) {
            return Err(invalid(format!(
                "image path {} is the fetch source itself",
                self.image_path.display()
            )));
        }
        if self.is_update {
            for backup in [&self.compose_backup_path, &self.manifest_backup_path] {
                if !backup.exists() {
                    return Err(invalid(format!(
                        "update is missing backup {}",
                        backup.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Check a whole batch before anything touches the host
///
/// # Errors
///
/// Returns an error for an empty batch, for any invalid element, and when the
/// self package appears more than once.
pub fn validate_batch(batch: &[PackageInstallState], self_package_name: &str) -> Result<(), Error> {
    if batch.is_empty() {
        return Err(InstallError::NoPackagesSpecified.into());
    }

    for state in batch {
        state.validate()?;
    }

    let count = batch
        .iter()
        .filter(|state| state.is_self(self_package_name))
        .count();
    if count > 1 {
        return Err(InstallError::DuplicateSelfPackage {
            package: self_package_name.to_string(),
            count,
        }
        .into());
    }

    Ok(())
}
