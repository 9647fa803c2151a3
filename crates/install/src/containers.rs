//! Container activation: start the new containers of a batch in order

use hearth_errors::{Error, InstallError};
use hearth_events::{EventEmitter, InstallEvent};
use hearth_platform::compose::{container_name_for, read_service_containers};
use hearth_platform::ComposeUpOptions;
use hearth_types::PackageInstallState;

use crate::restart::restart_patch;
use crate::InstallContext;

/// Split a batch into non-self packages in caller order and the self package
#[must_use]
pub fn order_for_activation<'a>(
    batch: &'a [PackageInstallState],
    self_package_name: &str,
) -> (Vec<&'a PackageInstallState>, Option<&'a PackageInstallState>) {
    let (own, others): (Vec<_>, Vec<_>) = batch
        .iter()
        .partition(|state| state.is_self(self_package_name));
    (others, own.into_iter().next())
}

fn state_changed(ctx: &InstallContext, state: &PackageInstallState, new_state: &str) {
    ctx.emit_install(InstallEvent::ContainerStateChanged {
        package: state.dnp_name.clone(),
        state: new_state.to_string(),
    });
}

/// Copy the package's file uploads into its service containers
async fn copy_file_uploads(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    let Some(uploads) = &state.file_uploads else {
        return Ok(());
    };
    let services = read_service_containers(&state.compose_path).await?;
    let prefix = ctx.settings.container_prefix(state.is_core);

    for (service, files) in uploads {
        let container = container_name_for(&services, service, &state.dnp_name, prefix);
        for (path, contents) in files {
            ctx.emit_debug(format!("copying {path} into {container}"));
            ctx.runtime
                .copy_to_container(&container, path, contents.as_bytes())
                .await?;
        }
    }
    Ok(())
}

async fn start_package(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    let up = ComposeUpOptions {
        timeout: state.docker_timeout,
        ..ComposeUpOptions::default()
    };

    if state.has_file_uploads() {
        let create = ComposeUpOptions {
            no_start: true,
            ..up.clone()
        };
        ctx.runtime.compose_up(&state.compose_path, &create).await?;
        state_changed(ctx, state, "created");

        copy_file_uploads(ctx, state).await?;
        state_changed(ctx, state, "files_copied");
    }

    ctx.runtime.compose_up(&state.compose_path, &up).await?;
    state_changed(ctx, state, "running");
    Ok(())
}

/// Start the containers of every package, the self package last
///
/// Packages are processed one at a time without retries. When the batch
/// contains the self package this never returns `Ok`: either the restart
/// helper replaces this process, or an error is returned.
///
/// # Errors
///
/// Returns `ContainerActivationFailed` for the first package that fails to
/// start, or the self restart error.
pub async fn start_containers(ctx: &InstallContext, batch: &[PackageInstallState]) -> Result<(), Error> {
    let (others, own) = order_for_activation(batch, &ctx.settings.self_package_name);

    for state in others {
        start_package(ctx, state)
            .await
            .map_err(|e| InstallError::ContainerActivationFailed {
                package: state.dnp_name.clone(),
                message: e.to_string(),
            })?;
    }

    if let Some(state) = own {
        restart_patch(ctx, state, batch).await?;
        return Err(InstallError::SelfRestartReturned {
            package: state.dnp_name.clone(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_types::{DistributedFile, Version};
    use std::path::Path;

    fn state(name: &str) -> PackageInstallState {
        PackageInstallState::from_layout(
            Path::new("/data"),
            name,
            Version::new(1, 0, 0),
            DistributedFile {
                source: "Qm".to_string(),
                hash: "Qm".to_string(),
                size: 1,
            },
        )
    }

    fn names(states: &[&PackageInstallState]) -> Vec<String> {
        states.iter().map(|s| s.dnp_name.clone()).collect()
    }

    #[test]
    fn self_package_goes_last() {
        let batch = vec![state("core"), state("b"), state("a")];
        let (others, own) = order_for_activation(&batch, "core");
        assert_eq!(names(&others), vec!["b", "a"]);
        assert_eq!(own.map(|s| s.dnp_name.as_str()), Some("core"));
    }

    #[test]
    fn batch_without_self_keeps_caller_order() {
        let batch = vec![state("c"), state("a"), state("b")];
        let (others, own) = order_for_activation(&batch, "core");
        assert_eq!(names(&others), vec!["c", "a", "b"]);
        assert!(own.is_none());
    }
}
