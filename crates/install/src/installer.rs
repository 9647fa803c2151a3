//! Main installer implementation

use hearth_errors::Error;
use hearth_events::{EventEmitter, FailureContext, InstallEvent, InstallStage};
use hearth_types::{validate_batch, PackageInstallState};
use std::future::Future;

use crate::acquisition::acquire_images;
use crate::activation::load_images;
use crate::cleanup::post_install_clean;
use crate::containers::start_containers;
use crate::restart::post_restart_patch;
use crate::rollback::rollback_packages;
use crate::InstallContext;

/// Entry point of the install pipeline
#[derive(Debug, Clone)]
pub struct Installer {
    ctx: InstallContext,
}

fn names_of(batch: &[PackageInstallState]) -> Vec<String> {
    batch.iter().map(|state| state.dnp_name.clone()).collect()
}

/// Whether the batch is left for the restart helper or the next start
fn skips_local_rollback(error: &Error) -> bool {
    matches!(error, Error::Install(e) if e.skips_local_rollback())
}

impl Installer {
    #[must_use]
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn context(&self) -> &InstallContext {
        &self.ctx
    }

    /// Install a batch of packages
    ///
    /// Images are acquired, then loaded, then containers are started in
    /// caller order with the self package last. Any failure rolls the whole
    /// batch back, except self restart failures which are settled by the
    /// restart helper on the next start. Completion notifications are sent
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is invalid (nothing is touched then) or
    /// if any stage fails.
    pub async fn install(&self, batch: &[PackageInstallState]) -> Result<(), Error> {
        validate_batch(batch, &self.ctx.settings.self_package_name)?;

        let names = names_of(batch);
        let overlapping: Vec<String> = self
            .ctx
            .flags
            .installing_packages()
            .into_iter()
            .filter(|name| names.contains(name))
            .collect();
        if !overlapping.is_empty() {
            self.ctx.emit_warning_with_context(
                "packages already have an install in flight",
                overlapping.join(", "),
            );
        }
        self.ctx.flags.flag_packages_are_installing(&names);
        self.ctx.emit_install(InstallEvent::BatchStarted {
            packages: names.clone(),
        });

        let result = self.run_stages(batch).await;
        match &result {
            Ok(()) => {
                post_install_clean(&self.ctx, batch).await;
                self.ctx.emit_install(InstallEvent::BatchCompleted {
                    packages: names.clone(),
                });
            }
            Err(error) => {
                self.ctx.emit_install(InstallEvent::BatchFailed {
                    packages: names.clone(),
                    failure: FailureContext::from_error(error),
                });
                if skips_local_rollback(error) {
                    self.ctx
                        .emit_warning("self restart did not complete; the update is settled on the next start");
                } else {
                    rollback_packages(&self.ctx, batch).await;
                }
            }
        }

        self.ctx.notifier().after_install(&names);
        result
    }

    async fn run_stages(&self, batch: &[PackageInstallState]) -> Result<(), Error> {
        let ctx = &self.ctx;
        self.stage(InstallStage::Acquisition, batch, acquire_images(ctx, batch))
            .await?;
        self.stage(InstallStage::ImageActivation, batch, load_images(ctx, batch))
            .await?;
        self.stage(
            InstallStage::ContainerActivation,
            batch,
            start_containers(ctx, batch),
        )
        .await
    }

    async fn stage<F>(&self, stage: InstallStage, batch: &[PackageInstallState], run: F) -> Result<(), Error>
    where
        F: Future<Output = Result<(), Error>>,
    {
        self.ctx.emit_install(InstallEvent::StageStarted {
            stage,
            packages: names_of(batch),
        });
        run.await?;
        self.ctx.emit_install(InstallEvent::StageCompleted { stage });
        Ok(())
    }

    /// Settle a self restart started by a previous process; call once at startup
    pub async fn post_restart_patch(&self) {
        post_restart_patch(&self.ctx).await;
    }

    /// Whether an install of `name` is in flight
    #[must_use]
    pub fn package_is_installing(&self, name: &str) -> bool {
        self.ctx.flags.package_is_installing(name)
    }
}
