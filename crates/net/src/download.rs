//! File download with progress reporting and verification

use futures::StreamExt;
use hearth_errors::{Error, NetworkError};
use hearth_hash::Hash;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::NetClient;

/// Bytes received so far for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub received: u64,
    /// Content length announced by the server, when known
    pub total: Option<u64>,
}

/// Progress callback invoked for every received chunk
pub type ProgressFn = dyn Fn(FetchProgress) + Send + Sync;

/// Download operation handle
pub struct Download {
    url: Url,
}

/// Result of a transfer
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub source: String,
    pub size: u64,
    pub hash: Hash,
}

/// Temporary sibling that receives bytes until they are verified
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".download");
    dest.with_file_name(name)
}

/// Verify `hash` and move the partial file into place, removing it on mismatch
async fn finish(temp_path: &Path, dest: &Path, hash: &Hash, expected: Option<&Hash>) -> Result<(), Error> {
    if let Some(expected) = expected {
        if hash != expected {
            let _ = tokio::fs::remove_file(temp_path).await;
            return Err(NetworkError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: hash.to_hex(),
            }
            .into());
        }
    }
    tokio::fs::rename(temp_path, dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))
}

async fn prepare(dest: &Path) -> Result<(PathBuf, File), Error> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let temp_path = partial_path(dest);
    let file = File::create(&temp_path)
        .await
        .map_err(|e| Error::io_with_path(&e, &temp_path))?;
    Ok((temp_path, file))
}

/// Write the response body into `file`, hashing every chunk
async fn stream_body(
    response: reqwest::Response,
    mut file: File,
    content_length: Option<u64>,
    on_progress: &ProgressFn,
) -> Result<(u64, Hash), Error> {
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;
    let mut hasher = blake3::Hasher::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;

        hasher.update(&chunk);
        file.write_all(&chunk).await?;

        downloaded += chunk.len() as u64;
        on_progress(FetchProgress {
            received: downloaded,
            total: content_length,
        });
    }

    file.flush().await?;
    Ok((downloaded, Hash::from(hasher.finalize())))
}

impl Download {
    /// Create a new download
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid or cannot be parsed.
    pub fn new(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        Ok(Self { url })
    }

    #[must_use]
    pub fn from_url(url: Url) -> Self {
        Self { url }
    }

    /// Execute the download
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails, the server returns an error status,
    /// the file cannot be written, or the hash verification fails (if expected).
    pub async fn execute(
        self,
        client: &NetClient,
        dest: &Path,
        expected_hash: Option<&Hash>,
        on_progress: &ProgressFn,
    ) -> Result<DownloadResult, Error> {
        let url_str = self.url.to_string();

        let response = client.get(url_str.as_str()).await?;

        if !response.status().is_success() {
            return Err(NetworkError::HttpError {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }
            .into());
        }

        let content_length = response.content_length();
        let (temp_path, file) = prepare(dest).await?;

        let (downloaded, hash) =
            match stream_body(response, file, content_length, on_progress).await {
                Ok(received) => received,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(e);
                }
            };
        finish(&temp_path, dest, &hash, expected_hash).await?;

        Ok(DownloadResult {
            source: url_str,
            size: downloaded,
            hash,
        })
    }
}

/// Copy a local file, hashing it on the way
///
/// # Errors
///
/// Returns an error if the source cannot be read, the destination cannot be
/// written, or the hash verification fails (if expected).
pub async fn copy_local(
    source: &Path,
    dest: &Path,
    expected_hash: Option<&Hash>,
    on_progress: &ProgressFn,
) -> Result<DownloadResult, Error> {
    let reader = File::open(source)
        .await
        .map_err(|e| Error::io_with_path(&e, source))?;
    let total = reader.metadata().await.ok().map(|m| m.len());
    let (temp_path, file) = prepare(dest).await?;

    let (hash, size) = match Hash::hash_and_copy(reader, file).await {
        Ok(copied) => copied,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };
    on_progress(FetchProgress {
        received: size,
        total,
    });
    finish(&temp_path, dest, &hash, expected_hash).await?;

    Ok(DownloadResult {
        source: source.display().to_string(),
        size,
        hash,
    })
}
