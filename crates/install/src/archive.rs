//! Image archive inspection
//!
//! Release images are `docker save` tarballs compressed with xz. Verifying
//! one means decoding the whole xz stream and finding a `manifest.json`
//! entry that tags the image with the expected reference.

use async_compression::tokio::bufread::XzDecoder;
use hearth_errors::{Error, InstallError};
use hearth_types::PackageInstallState;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tokio::io::BufReader;
use tokio_util::io::SyncIoBridge;

const MANIFEST_ENTRY: &str = "manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawManifestEntry {
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    #[serde(default)]
    layers: Vec<String>,
}

/// The parts of an image archive manifest the pipeline uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageArchiveManifest {
    pub repo_tags: Vec<String>,
    /// Layer entries in load order (e.g. `<id>/layer.tar`)
    pub layers: Vec<String>,
}

impl ImageArchiveManifest {
    /// Parse the `manifest.json` document of an image archive
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a manifest list.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let entries: Vec<RawManifestEntry> = serde_json::from_slice(bytes)?;
        let mut manifest = Self::default();
        for entry in entries {
            manifest.repo_tags.extend(entry.repo_tags.unwrap_or_default());
            manifest.layers.extend(entry.layers);
        }
        Ok(manifest)
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.repo_tags.iter().any(|t| t == tag)
    }
}

/// Walk the tar stream and return the manifest bytes
///
/// With `drain` the whole stream is consumed, which makes the decoder check
/// the compressed data up to its end.
fn scan_archive<R: Read>(reader: R, drain: bool) -> std::io::Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(reader);
    let mut manifest = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_os_str() == MANIFEST_ENTRY {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            manifest = Some(bytes);
            if !drain {
                return Ok(manifest);
            }
        }
    }

    if drain {
        let mut rest = archive.into_inner();
        std::io::copy(&mut rest, &mut std::io::sink())?;
    }
    Ok(manifest)
}

/// Read the manifest of the archive at `path`
///
/// # Errors
///
/// Returns `InstallError::VerificationFailed` when the file cannot be
/// decoded, has no manifest or the manifest is malformed.
pub async fn read_manifest(
    package: &str,
    path: &Path,
    drain: bool,
) -> Result<ImageArchiveManifest, Error> {
    let failed = |reason: String| -> Error {
        InstallError::VerificationFailed {
            package: package.to_string(),
            reason,
        }
        .into()
    };

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| failed(format!("cannot open {}: {e}", path.display())))?;
    let reader = SyncIoBridge::new(XzDecoder::new(BufReader::new(file)));

    let scanned = tokio::task::spawn_blocking(move || scan_archive(reader, drain))
        .await
        .map_err(|e| Error::from(InstallError::TaskError {
            message: e.to_string(),
        }))?
        .map_err(|e| failed(format!("corrupted image archive: {e}")))?;

    let bytes = scanned.ok_or_else(|| failed(format!("archive has no {MANIFEST_ENTRY}")))?;
    ImageArchiveManifest::parse(&bytes).map_err(|e| failed(format!("invalid {MANIFEST_ENTRY}: {e}")))
}

/// Verify a downloaded image before it is loaded
///
/// Checks that the file is present and non-empty, that the xz stream
/// decodes completely and that the archive carries the package's tag.
///
/// # Errors
///
/// Returns `InstallError::VerificationFailed` describing the first check
/// that failed.
pub async fn verify_image_archive(state: &PackageInstallState) -> Result<ImageArchiveManifest, Error> {
    let failed = |reason: String| -> Error {
        InstallError::VerificationFailed {
            package: state.dnp_name.clone(),
            reason,
        }
        .into()
    };

    let metadata = tokio::fs::metadata(&state.image_path)
        .await
        .map_err(|_| failed(format!("{} does not exist", state.image_path.display())))?;
    if metadata.len() == 0 {
        return Err(failed(format!("{} is empty", state.image_path.display())));
    }

    let manifest = read_manifest(&state.dnp_name, &state.image_path, true).await?;
    let tag = state.image_tag();
    if !manifest.has_tag(&tag) {
        return Err(failed(format!(
            "archive is tagged {:?}, expected {tag}",
            manifest.repo_tags
        )));
    }
    Ok(manifest)
}
