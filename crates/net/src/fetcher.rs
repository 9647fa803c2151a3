//! Content fetching for release artifacts

use async_trait::async_trait;
use hearth_errors::{Error, NetworkError};
use hearth_events::{EventEmitter, EventSender, FailureContext};
use hearth_hash::Hash;
use hearth_types::DistributedFile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use url::Url;

use crate::download::{copy_local, Download, DownloadResult, ProgressFn};
use crate::NetClient;

/// Retrieves the content described by a `DistributedFile` into a local path
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `file` into `dest`, calling `on_progress` as bytes arrive
    ///
    /// `dest` only appears once the content is complete (and verified when
    /// the descriptor carries a BLAKE3 digest).
    async fn fetch(
        &self,
        file: &DistributedFile,
        dest: &Path,
        on_progress: &ProgressFn,
    ) -> Result<DownloadResult, Error>;
}

/// Where a descriptor's source points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Http(Url),
    Local(PathBuf),
}

/// Fetcher that resolves content identifiers against an HTTP gateway
#[derive(Clone)]
pub struct GatewayFetcher {
    client: NetClient,
    gateway: Url,
    event_sender: Option<EventSender>,
}

impl GatewayFetcher {
    /// # Errors
    ///
    /// Returns an error if `gateway` is not a valid URL.
    pub fn new(
        client: NetClient,
        gateway: &str,
        event_sender: Option<EventSender>,
    ) -> Result<Self, Error> {
        let mut gateway = crate::parse_url(gateway)?;
        // Url::join drops the last path segment unless it ends with a slash
        if !gateway.path().ends_with('/') {
            let path = format!("{}/", gateway.path());
            gateway.set_path(&path);
        }
        Ok(Self {
            client,
            gateway,
            event_sender,
        })
    }

    /// Map a descriptor source to a URL or a local path
    ///
    /// # Errors
    ///
    /// Returns an error for sources that are neither URLs, local paths nor
    /// content identifiers.
    pub fn resolve(&self, source: &str) -> Result<ResolvedSource, Error> {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            return crate::parse_url(source).map(ResolvedSource::Http);
        }
        if let Some(path) = source.strip_prefix("file://") {
            return Ok(ResolvedSource::Local(PathBuf::from(path)));
        }

        let cid_path = source
            .strip_prefix("/ipfs/")
            .or_else(|| source.strip_prefix("ipfs/"))
            .or_else(|| source.strip_prefix("ipfs://"));
        if let Some(cid_path) = cid_path {
            return self.gateway_url(cid_path);
        }
        if source.starts_with('/') {
            return Ok(ResolvedSource::Local(PathBuf::from(source)));
        }
        if !source.is_empty() && source.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return self.gateway_url(source);
        }

        Err(NetworkError::UnsupportedSource(source.to_string()).into())
    }

    fn gateway_url(&self, cid_path: &str) -> Result<ResolvedSource, Error> {
        self.gateway
            .join(&format!("ipfs/{cid_path}"))
            .map(ResolvedSource::Http)
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
    }
}

impl EventEmitter for GatewayFetcher {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

#[async_trait]
impl ContentFetcher for GatewayFetcher {
    async fn fetch(
        &self,
        file: &DistributedFile,
        dest: &Path,
        on_progress: &ProgressFn,
    ) -> Result<DownloadResult, Error> {
        let expected = Hash::parse_digest(&file.hash);
        let resolved = self.resolve(&file.source)?;
        self.emit_debug_with_context(
            "fetching release content",
            HashMap::from([
                ("source".to_string(), file.source.clone()),
                ("dest".to_string(), dest.display().to_string()),
                ("verify".to_string(), expected.is_some().to_string()),
            ]),
        );

        let start = Instant::now();
        self.emit_progress_started(&file.source, "fetch", Some(file.size));
        let result = match resolved {
            ResolvedSource::Http(url) => {
                Download::from_url(url)
                    .execute(&self.client, dest, expected.as_ref(), on_progress)
                    .await
            }
            ResolvedSource::Local(path) => {
                copy_local(&path, dest, expected.as_ref(), on_progress).await
            }
        };
        match &result {
            Ok(_) => self.emit_progress_completed(&file.source, start.elapsed()),
            Err(e) => self.emit_progress_failed(&file.source, FailureContext::from_error(e)),
        }
        result
    }
}
