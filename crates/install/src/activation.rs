//! Image activation: load verified archives into the runtime image store

use futures::future::join_all;
use hearth_errors::{Error, InstallError};
use hearth_events::{EventEmitter, InstallEvent};
use hearth_platform::LayerProgress;
use hearth_types::PackageInstallState;
use std::collections::HashSet;

use crate::archive::read_manifest;
use crate::InstallContext;

/// Turns per-layer byte progress into an overall integer percentage
///
/// Each layer of the archive manifest weighs the same:
/// `completed / layers + current_fraction / layers`.
#[derive(Debug, Clone)]
pub struct LayerProgressEstimator {
    layers: Vec<String>,
    completed: HashSet<String>,
    current_fraction: f64,
    last_percent: Option<u8>,
}

impl LayerProgressEstimator {
    #[must_use]
    pub fn new(layers: Vec<String>) -> Self {
        Self {
            layers,
            completed: HashSet::new(),
            current_fraction: 0.0,
            last_percent: None,
        }
    }

    /// Feed one progress report; returns the percentage when it changed
    pub fn update(&mut self, progress: &LayerProgress) -> Option<u8> {
        if self.layers.is_empty() || !self.layers.contains(&progress.layer_id) {
            return None;
        }

        if progress.total == 0 || progress.current >= progress.total {
            self.completed.insert(progress.layer_id.clone());
            self.current_fraction = 0.0;
        } else if !self.completed.contains(&progress.layer_id) {
            #[allow(clippy::cast_precision_loss)]
            let fraction = progress.current as f64 / progress.total as f64;
            self.current_fraction = fraction;
        }

        let percent = self.percent();
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn percent(&self) -> u8 {
        let total = self.layers.len() as f64;
        let done = (self.completed.len() as f64 + self.current_fraction) / total;
        (done * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}

async fn load_image(ctx: &InstallContext, state: &PackageInstallState) -> Result<(), Error> {
    let load_failed = |message: String| -> Error {
        InstallError::ImageLoadFailed {
            package: state.dnp_name.clone(),
            message,
        }
        .into()
    };

    let manifest = read_manifest(&state.dnp_name, &state.image_path, false)
        .await
        .map_err(|e| load_failed(e.to_string()))?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<LayerProgress>();
    let reporter = {
        let events = ctx.event_sender.clone();
        let package = state.dnp_name.clone();
        let mut estimator = LayerProgressEstimator::new(manifest.layers);
        tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                if let Some(percent) = estimator.update(&progress) {
                    events.emit_install(InstallEvent::LoadProgress {
                        package: package.clone(),
                        percent,
                    });
                }
            }
        })
    };

    let loaded = ctx.runtime.image_load(&state.image_path, Some(tx)).await;
    // The sender is gone once the load returns, so the reporter finishes
    let _ = reporter.await;
    loaded.map_err(|e| load_failed(e.to_string()))?;

    ctx.emit_install(InstallEvent::ImageLoaded {
        package: state.dnp_name.clone(),
    });
    Ok(())
}

/// Load every image of the batch, waiting for all loads
///
/// # Errors
///
/// Returns the first load failure in batch order after every load settled.
pub async fn load_images(ctx: &InstallContext, batch: &[PackageInstallState]) -> Result<(), Error> {
    let results = join_all(batch.iter().map(|state| load_image(ctx, state))).await;
    results.into_iter().collect()
}
