//! Image acquisition: fetch and verify every image of a batch

use futures::future::join_all;
use hearth_errors::{Error, InstallError};
use hearth_events::{EventEmitter, EventSender, FailureContext, InstallEvent};
use hearth_net::FetchProgress;
use hearth_types::PackageInstallState;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::archive::verify_image_archive;
use crate::InstallContext;

/// Per-download progress state shared with the fetch callback
struct DownloadReporter {
    package: String,
    expected: u64,
    last_percent: AtomicU8,
    oversize_reported: AtomicBool,
    events: Option<EventSender>,
}

impl EventEmitter for DownloadReporter {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl DownloadReporter {
    fn new(state: &PackageInstallState, events: Option<EventSender>) -> Self {
        Self {
            package: state.dnp_name.clone(),
            expected: state.image_file.size,
            last_percent: AtomicU8::new(0),
            oversize_reported: AtomicBool::new(false),
            events,
        }
    }

    fn report(&self, progress: FetchProgress) {
        let total = if self.expected > 0 {
            self.expected
        } else {
            progress.total.unwrap_or(0)
        };
        if total == 0 {
            return;
        }

        if progress.received > total {
            if !self.oversize_reported.swap(true, Ordering::Relaxed) {
                self.emit_install(InstallEvent::DownloadOversize {
                    package: self.package.clone(),
                    expected: total,
                    received: progress.received,
                });
            }
            return;
        }

        let percent = download_percent(progress.received, total);
        if self.last_percent.swap(percent, Ordering::Relaxed) != percent {
            self.emit_install(InstallEvent::DownloadProgress {
                package: self.package.clone(),
                percent,
            });
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn download_percent(received: u64, total: u64) -> u8 {
    (u128::from(received.min(total)) * 100 / u128::from(total)) as u8
}

/// Fetch one image into its `image_path` and verify it
async fn acquire_image(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    if let Some(parent) = state.image_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let reporter = DownloadReporter::new(state, ctx.event_sender.clone());
    let on_progress = move |progress: FetchProgress| reporter.report(progress);

    ctx.fetcher
        .fetch(&state.image_file, &state.image_path, &on_progress)
        .await
        .map_err(|e| InstallError::DownloadFailed {
            package: state.dnp_name.clone(),
            message: e.to_string(),
        })?;

    verify_image_archive(state).await?;
    ctx.emit_install(InstallEvent::ImageVerified {
        package: state.dnp_name.clone(),
        version: state.sem_version.clone(),
    });
    Ok(())
}

/// Fetch and verify the images of every package, waiting for all of them
///
/// Failures of core packages are reported as warnings and do not stop the
/// batch.
///
/// # Errors
///
/// Returns the first failure of a non-core package, in batch order, once
/// every fetch has settled.
pub async fn acquire_images(ctx: &InstallContext, batch: &[PackageInstallState]) -> Result<(), Error> {
    let results = join_all(batch.iter().map(|state| acquire_image(ctx, state))).await;

    let mut first_error = None;
    for (state, result) in batch.iter().zip(results) {
        let Err(error) = result else { continue };
        if state.is_core {
            ctx.emit_install(InstallEvent::CoreVerificationFailed {
                package: state.dnp_name.clone(),
                failure: FailureContext::from_error(&error),
            });
        } else if first_error.is_none() {
            first_error = Some(error);
        }
    }

    first_error.map_or(Ok(()), Err)
}
