//! Container runtime abstraction
//!
//! The install pipeline only talks to the runtime through this trait, so the
//! docker CLI driver can be swapped for an in-memory fake in tests.

use async_trait::async_trait;
use hearth_errors::Error;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;

/// Options for bringing a compose project up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeUpOptions {
    /// Seconds the runtime waits for containers to stop before killing them
    pub timeout: Option<u64>,
    pub force_recreate: bool,
    /// Create containers without starting them
    pub no_start: bool,
    /// Restrict the operation to these services
    pub service_names: Vec<String>,
}

/// Progress of one layer while an image archive is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerProgress {
    pub layer_id: String,
    pub current: u64,
    pub total: u64,
}

/// Sender half used by `image_load` to report layer progress
pub type LayerProgressSender = UnboundedSender<LayerProgress>;

/// The parts of a container inspection the pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspect {
    pub running: bool,
    pub exit_code: i64,
    pub finished_at: Option<String>,
    /// Image reference the container was created from
    pub image: String,
}

/// One entry of the runtime's image store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub repository: String,
    pub tag: String,
    pub id: String,
}

impl ImageSummary {
    /// `repository:tag` reference
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Operations the install pipeline performs against the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and (unless `no_start`) start the services of a compose file
    async fn compose_up(&self, compose_path: &Path, options: &ComposeUpOptions)
        -> Result<(), Error>;

    /// Stop and remove the containers of a compose file
    async fn compose_rm(&self, compose_path: &Path) -> Result<(), Error>;

    /// Load an image archive into the image store, reporting layer progress
    async fn image_load(
        &self,
        archive_path: &Path,
        progress: Option<LayerProgressSender>,
    ) -> Result<(), Error>;

    /// List images matching a reference filter
    async fn image_list(&self, reference: &str) -> Result<Vec<ImageSummary>, Error>;

    async fn image_remove(&self, reference: &str) -> Result<(), Error>;

    /// Inspect a container; `None` when it does not exist
    async fn container_inspect(&self, name: &str) -> Result<Option<ContainerInspect>, Error>;

    async fn container_remove(&self, name: &str) -> Result<(), Error>;

    /// Write `contents` to `path` inside a container
    async fn copy_to_container(
        &self,
        container: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), Error>;

    /// Run a shell command on the host and wait for it to finish
    ///
    /// Succeeds only when the command exits with status zero.
    async fn launch_blocking(&self, command: &str) -> Result<(), Error>;
}
