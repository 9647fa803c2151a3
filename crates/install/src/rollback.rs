//! Rollback of a failed batch
//!
//! Every step is attempted for every package even when earlier ones fail.
//! Outcomes go into a [`RollbackReport`]; failures are emitted as events and
//! never returned.

use hearth_events::{EventEmitter, FailureContext, InstallEvent, InstallStage};
use hearth_platform::fs::{copy_then_delete, remove_file_if_exists};
use hearth_platform::ComposeUpOptions;
use hearth_types::{PackageInstallState, RollbackReport, RollbackStep};

use crate::InstallContext;

async fn rollback_package(
    ctx: &InstallContext,
    state: &PackageInstallState,
    report: &mut RollbackReport,
) {
    let package = state.dnp_name.as_str();

    if state.is_update {
        report.record(
            package,
            RollbackStep::RestoreCompose,
            copy_then_delete(&state.compose_backup_path, &state.compose_path).await,
        );
        report.record(
            package,
            RollbackStep::RestoreManifest,
            copy_then_delete(&state.manifest_backup_path, &state.manifest_path).await,
        );
    }

    report.record(
        package,
        RollbackStep::DeleteImage,
        remove_file_if_exists(&state.image_path).await.map(|_| ()),
    );

    // The self package's containers were never touched by this process
    if state.is_self(&ctx.settings.self_package_name) {
        return;
    }

    if state.is_update {
        let options = ComposeUpOptions {
            timeout: state.docker_timeout,
            ..ComposeUpOptions::default()
        };
        report.record(
            package,
            RollbackStep::RestartContainers,
            ctx.runtime.compose_up(&state.compose_path, &options).await,
        );
    } else {
        report.record(
            package,
            RollbackStep::RemoveContainers,
            ctx.runtime.compose_rm(&state.compose_path).await,
        );
    }
}

/// Revert every package of the batch to its state before the install
pub async fn rollback_packages(ctx: &InstallContext, batch: &[PackageInstallState]) -> RollbackReport {
    let mut report = RollbackReport::new();
    for state in batch {
        rollback_package(ctx, state, &mut report).await;
    }

    let mut failed_steps = 0;
    for outcome in report.failures() {
        if let Err(error) = &outcome.result {
            failed_steps += 1;
            ctx.emit_install(InstallEvent::StepFailed {
                stage: InstallStage::Rollback,
                package: outcome.package.clone(),
                step: outcome.step.to_string(),
                failure: FailureContext::from_error(error),
            });
        }
    }

    ctx.emit_install(InstallEvent::RollbackCompleted {
        packages: batch.iter().map(|s| s.dnp_name.clone()).collect(),
        failed_steps,
    });
    report
}
