//! Cleanup after a successful batch

use chrono::Utc;
use hearth_errors::Error;
use hearth_events::{EventEmitter, FailureContext, InstallEvent, InstallStage};
use hearth_platform::fs::{list_files, remove_file_if_exists};
use hearth_types::paths::is_image_archive;
use hearth_types::{CleanupReport, CleanupStep, InstalledMetadata, PackageInstallState, Version};

use crate::InstallContext;

async fn record_metadata(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    let previous = ctx.store.installed_metadata(&state.dnp_name).await?;
    let metadata = InstalledMetadata::record(previous.as_ref(), state.sem_version.clone(), Utc::now());
    ctx.store
        .set_installed_metadata(&state.dnp_name, &metadata)
        .await
}

async fn delete_backups(state: &PackageInstallState) -> Result<(), Error> {
    // Attempt both even if the first fails
    let compose = remove_file_if_exists(&state.compose_backup_path).await;
    let manifest = remove_file_if_exists(&state.manifest_backup_path).await;
    compose.and(manifest).map(|_| ())
}

/// Remove image archives left next to the package's image by older installs
async fn delete_stale_archives(state: &PackageInstallState) -> Result<(), Error> {
    let Some(dir) = state.image_path.parent() else {
        return Ok(());
    };
    if !dir.exists() {
        return Ok(());
    }

    let mut first_error = None;
    for file in list_files(dir).await? {
        let is_archive = file
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_image_archive);
        if is_archive && file != state.image_path {
            if let Err(e) = remove_file_if_exists(&file).await {
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Remove images of the package tagged with a lower version than the one installed
async fn remove_old_images(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    let images = ctx.runtime.image_list(&state.dnp_name).await?;

    let mut first_error = None;
    for image in images {
        if image.repository != state.dnp_name {
            continue;
        }
        let Ok(version) = Version::parse(&image.tag) else {
            continue;
        };
        if version < state.sem_version {
            ctx.emit_debug(format!("removing old image {}", image.reference()));
            if let Err(e) = ctx.runtime.image_remove(&image.reference()).await {
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Finalize every package of a successful batch
///
/// Failures are collected and emitted as events, never returned.
pub async fn post_install_clean(ctx: &InstallContext, batch: &[PackageInstallState]) -> CleanupReport {
    let mut report = CleanupReport::new();

    for state in batch {
        let package = state.dnp_name.as_str();
        report.record(package, CleanupStep::RecordMetadata, record_metadata(ctx, state).await);
        report.record(package, CleanupStep::DeleteBackups, delete_backups(state).await);
        report.record(
            package,
            CleanupStep::DeleteImage,
            remove_file_if_exists(&state.image_path).await.map(|_| ()),
        );
        report.record(
            package,
            CleanupStep::DeleteStaleArchives,
            delete_stale_archives(state).await,
        );
        report.record(
            package,
            CleanupStep::RemoveOldImages,
            remove_old_images(ctx, state).await,
        );
    }

    let mut failed_steps = 0;
    for outcome in report.failures() {
        if let Err(error) = &outcome.result {
            failed_steps += 1;
            ctx.emit_install(InstallEvent::StepFailed {
                stage: InstallStage::Cleanup,
                package: outcome.package.clone(),
                step: outcome.step.to_string(),
                failure: FailureContext::from_error(error),
            });
        }
    }

    ctx.emit_install(InstallEvent::CleanupCompleted {
        packages: batch.iter().map(|s| s.dnp_name.clone()).collect(),
        failed_steps,
    });
    report
}
