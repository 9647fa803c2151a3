#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for hearth
//!
//! This crate fetches release artifacts over HTTP (directly or through a
//! content gateway) with retries, progress callbacks and BLAKE3 verification.

mod client;
mod download;
mod fetcher;

pub use client::{NetClient, NetConfig};
pub use download::{copy_local, Download, DownloadResult, FetchProgress, ProgressFn};
pub use fetcher::{ContentFetcher, GatewayFetcher, ResolvedSource};

use hearth_errors::{Error, NetworkError};
use url::Url;

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed or invalid according to RFC 3986.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}
