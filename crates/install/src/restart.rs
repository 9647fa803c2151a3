//! Self restart protocol
//!
//! The orchestrator cannot recreate its own container while running inside
//! it. `restart_patch` checkpoints the batch, writes a shell script and
//! blocks on a helper container that runs it. The script recreates the self
//! container, which ends this process. On the next start
//! `post_restart_patch` reads the helper's exit code and finishes the batch:
//! cleanup when it succeeded, rollback otherwise.

use hearth_errors::{Error, InstallError};
use hearth_events::{EventEmitter, FailureContext, InstallEvent, InstallStage};
use hearth_platform::fs::write_atomic;
use hearth_types::PackageInstallState;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

use crate::cleanup::post_install_clean;
use crate::rollback::rollback_packages;
use crate::{InstallContext, InstallSettings};

/// Inputs of the default helper script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartScriptParams {
    /// Runtime client inside the helper image
    pub docker_binary: String,
    /// Compose invocation (e.g. `docker compose`)
    pub compose_command: String,
    pub compose_path: PathBuf,
    pub compose_backup_path: PathBuf,
    pub self_container_name: String,
}

impl RestartScriptParams {
    #[must_use]
    pub fn new(settings: &InstallSettings, state: &PackageInstallState) -> Self {
        Self {
            docker_binary: settings.docker_binary.clone(),
            compose_command: settings.compose_command.clone(),
            compose_path: state.compose_path.clone(),
            compose_backup_path: state.compose_backup_path.clone(),
            self_container_name: settings.self_container_name.clone(),
        }
    }
}

/// Quote `value` for `sh` unless it only holds characters the shell leaves alone
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./:@%+=,".contains(&b));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Render the default helper script
///
/// The new compose file is brought up with forced recreation. If that fails
/// the backup compose file is brought up again, recreating the container
/// only when the old one is no longer running. The script exits with the
/// status of the first `up`.
#[must_use]
pub fn render_restart_script(params: &RestartScriptParams) -> String {
    let compose = params
        .compose_command
        .split_whitespace()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ");
    let docker = shell_quote(&params.docker_binary);
    let new = shell_quote(&params.compose_path.display().to_string());
    let backup = shell_quote(&params.compose_backup_path.display().to_string());
    let name_filter = shell_quote(&format!("name=^{}$", params.self_container_name));

    format!(
        "{compose} -f {new} up -d --force-recreate
UP_EXIT_CODE=$?
if [ $UP_EXIT_CODE -ne 0 ]; then
  if [ -n \"$({docker} ps -q -f {name_filter} -f status=running)\" ]; then
    {compose} -f {backup} up -d
  else
    {compose} -f {backup} up -d --force-recreate
  fi
fi
exit $UP_EXIT_CODE
"
    )
}

/// Render the default command that runs the helper container
#[must_use]
pub fn render_launch_command(settings: &InstallSettings, image: &str, script_path: &Path) -> String {
    let data = settings.data_dir.display();
    let socket = settings.docker_socket.display();
    format!(
        "{docker} run --name {helper} --network none -v {data_mount} -v {socket_mount} --entrypoint /bin/sh {image} {script}",
        docker = shell_quote(&settings.docker_binary),
        helper = shell_quote(&settings.helper_name),
        data_mount = shell_quote(&format!("{data}:{data}")),
        socket_mount = shell_quote(&format!("{socket}:{socket}")),
        image = shell_quote(image),
        script = shell_quote(&script_path.display().to_string()),
    )
}

/// Image the running orchestrator was started from
///
/// Falls back to the new release's tag when the self container cannot be
/// inspected; the helper only needs a shell and the runtime client.
async fn current_self_image(ctx: &InstallContext, state: &PackageInstallState) -> String {
    match ctx
        .runtime
        .container_inspect(&ctx.settings.self_container_name)
        .await
    {
        Ok(Some(inspect)) => inspect.image,
        Ok(None) => state.image_tag(),
        Err(e) => {
            ctx.emit_warning_with_context(
                format!("cannot inspect {}", ctx.settings.self_container_name),
                e.to_string(),
            );
            state.image_tag()
        }
    }
}

/// Hand the self package's container step to the restart helper
///
/// Returns only if the helper command finished without replacing this
/// process.
///
/// # Errors
///
/// Returns `InstallError::SelfRestartFailed` when the launch fails after the
/// helper container was created; the checkpoint is kept and the next start
/// settles the batch from the helper's exit code. Any earlier failure clears
/// the checkpoint and returns `InstallError::SelfRestartNotStarted`, which
/// the caller rolls back locally.
pub async fn restart_patch(
    ctx: &InstallContext,
    state: &PackageInstallState,
    batch: &[PackageInstallState],
) -> Result<(), Error> {
    let message = match prepare_helper(ctx, state, batch).await {
        Ok(launch) => {
            ctx.emit_install(InstallEvent::SelfRestartLaunching {
                package: state.dnp_name.clone(),
                script_path: ctx.settings.restart_script_path.display().to_string(),
            });
            let Err(e) = ctx.runtime.launch_blocking(&launch).await else {
                return Ok(());
            };
            if helper_exists(ctx).await {
                return Err(InstallError::SelfRestartFailed {
                    package: state.dnp_name.clone(),
                    message: e.to_string(),
                }
                .into());
            }
            e.to_string()
        }
        Err(message) => message,
    };

    if let Err(e) = ctx.store.clear_core_update_batch().await {
        ctx.emit_warning_with_context("cannot clear the update checkpoint", e.to_string());
    }
    Err(InstallError::SelfRestartNotStarted {
        package: state.dnp_name.clone(),
        message,
    }
    .into())
}

/// Whether the helper container exists; an inspect failure counts as absent
async fn helper_exists(ctx: &InstallContext) -> bool {
    match ctx.runtime.container_inspect(&ctx.settings.helper_name).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            ctx.emit_warning_with_context(
                format!("cannot inspect {}", ctx.settings.helper_name),
                e.to_string(),
            );
            false
        }
    }
}

/// Persist the checkpoint and write the script; yields the launch command
async fn prepare_helper(
    ctx: &InstallContext,
    state: &PackageInstallState,
    batch: &[PackageInstallState],
) -> Result<String, String> {
    ctx.store
        .set_core_update_batch(batch)
        .await
        .map_err(|e| format!("cannot persist batch: {e}"))?;

    let script = state
        .metadata
        .restart_command
        .clone()
        .unwrap_or_else(|| render_restart_script(&RestartScriptParams::new(&ctx.settings, state)));
    let script_path = &ctx.settings.restart_script_path;
    write_atomic(script_path, script.as_bytes())
        .await
        .map_err(|e| format!("cannot write {}: {e}", script_path.display()))?;

    if let Err(e) = ctx.runtime.container_remove(&ctx.settings.helper_name).await {
        ctx.emit_warning_with_context(
            format!("cannot remove leftover {}", ctx.settings.helper_name),
            e.to_string(),
        );
    }

    Ok(match &state.metadata.restart_launch_command {
        Some(command) => command.clone(),
        None => {
            let image = current_self_image(ctx, state).await;
            render_launch_command(&ctx.settings, &image, script_path)
        }
    })
}

/// Exit code of the helper container, waiting while it still runs
///
/// `None` when there is no helper. A helper still running after the poll
/// timeout, or one that disappears while polled, counts as failed.
async fn helper_exit_code(ctx: &InstallContext) -> Result<Option<i64>, Error> {
    let helper = &ctx.settings.helper_name;
    let Some(mut inspect) = ctx.runtime.container_inspect(helper).await? else {
        return Ok(None);
    };

    let deadline = Instant::now() + ctx.settings.helper_poll_timeout;
    while inspect.running {
        if Instant::now() >= deadline {
            ctx.emit_warning(format!(
                "{helper} still running after {:?}, treating it as failed",
                ctx.settings.helper_poll_timeout
            ));
            return Ok(Some(1));
        }
        tokio::time::sleep(ctx.settings.helper_poll_interval).await;
        match ctx.runtime.container_inspect(helper).await? {
            Some(next) => inspect = next,
            None => {
                ctx.emit_warning(format!("{helper} disappeared while running"));
                return Ok(Some(1));
            }
        }
    }
    Ok(Some(inspect.exit_code))
}

fn step_failed(ctx: &InstallContext, package: &str, step: &str, error: &Error) {
    ctx.emit_install(InstallEvent::StepFailed {
        stage: InstallStage::SelfRestart,
        package: package.to_string(),
        step: step.to_string(),
        failure: FailureContext::from_error(error),
    });
}

/// Finish a self restart left by a previous process
///
/// Runs at startup. Every failure is reported as an event; nothing here
/// stops the daemon from starting.
pub async fn post_restart_patch(ctx: &InstallContext) {
    let helper = ctx.settings.helper_name.clone();
    let exit_code = match helper_exit_code(ctx).await {
        Ok(Some(code)) => code,
        Ok(None) => {
            ctx.emit_debug("no pending self restart");
            return;
        }
        Err(e) => {
            step_failed(ctx, &helper, "inspect_helper", &e);
            return;
        }
    };

    let batch = match ctx.store.core_update_batch().await {
        Ok(batch) => batch,
        Err(e) => {
            step_failed(ctx, &helper, "load_checkpoint", &e);
            None
        }
    };

    if let Some(batch) = batch {
        let names: Vec<String> = batch.iter().map(|s| s.dnp_name.clone()).collect();
        ctx.emit_install(InstallEvent::PendingRestartFound {
            helper: helper.clone(),
            exit_code,
            packages: names.clone(),
        });

        if exit_code == 0 {
            post_install_clean(ctx, &batch).await;
        } else {
            rollback_packages(ctx, &batch).await;
        }

        if let Err(e) = ctx.store.clear_core_update_batch().await {
            step_failed(ctx, &helper, "clear_checkpoint", &e);
        }
        ctx.notifier().after_install(&names);
    } else {
        ctx.emit_warning(format!(
            "{helper} exited with {exit_code} but no update batch was persisted"
        ));
    }

    if let Err(e) = ctx.runtime.container_remove(&helper).await {
        step_failed(ctx, &helper, "remove_helper", &e);
    }
}
