//! On-disk layout of an installed package

use std::path::{Path, PathBuf};

use crate::Version;

/// Compose file name inside a package directory
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
/// Manifest file name inside a package directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
/// Suffix appended to a file to form its backup
pub const BACKUP_SUFFIX: &str = ".backup";
/// Extensions recognised as release image archives
pub const IMAGE_EXTENSIONS: &[&str] = &[".txz", ".tar.xz"];

/// Paths of one package under the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePaths {
    pub dnp_name: String,
    pub package_dir: PathBuf,
    pub compose: PathBuf,
    pub compose_backup: PathBuf,
    pub manifest: PathBuf,
    pub manifest_backup: PathBuf,
}

impl PackagePaths {
    #[must_use]
    pub fn new(data_dir: &Path, dnp_name: &str) -> Self {
        let package_dir = data_dir.join(dnp_name);
        Self {
            dnp_name: dnp_name.to_string(),
            compose: package_dir.join(COMPOSE_FILE_NAME),
            compose_backup: package_dir.join(format!("{COMPOSE_FILE_NAME}{BACKUP_SUFFIX}")),
            manifest: package_dir.join(MANIFEST_FILE_NAME),
            manifest_backup: package_dir.join(format!("{MANIFEST_FILE_NAME}{BACKUP_SUFFIX}")),
            package_dir,
        }
    }

    /// Where the release archive for `version` is stored
    #[must_use]
    pub fn image_path(&self, version: &Version) -> PathBuf {
        self.package_dir
            .join(format!("{}_{version}.txz", self.dnp_name))
    }
}

/// Whether a file name looks like a release image archive
#[must_use]
pub fn is_image_archive(file_name: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_archive_extensions() {
        assert!(is_image_archive("a_1.0.0.txz"));
        assert!(is_image_archive("a_1.0.0.tar.xz"));
        assert!(!is_image_archive("docker-compose.yml"));
        assert!(!is_image_archive("a.tar"));
    }
}
