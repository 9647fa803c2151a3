//! Shared dependencies of the pipeline stages

use hearth_config::Config;
use hearth_events::{EventEmitter, EventSender};
use hearth_net::ContentFetcher;
use hearth_platform::ContainerRuntime;
use hearth_state::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::flags::InstallFlagTracker;
use crate::notifier::CompletionNotifier;

/// Host-specific names and paths the pipeline works with
#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub self_package_name: String,
    pub self_container_name: String,
    pub core_container_prefix: String,
    pub package_container_prefix: String,
    pub data_dir: PathBuf,
    pub restart_script_path: PathBuf,
    pub docker_socket: PathBuf,
    pub docker_binary: String,
    /// Compose invocation as written in shell scripts (e.g. `docker compose`)
    pub compose_command: String,
    pub helper_name: String,
    pub helper_poll_timeout: Duration,
    pub helper_poll_interval: Duration,
}

impl InstallSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            self_package_name: config.general.self_package_name.clone(),
            self_container_name: config.general.self_container_name.clone(),
            core_container_prefix: config.general.core_container_prefix.clone(),
            package_container_prefix: config.general.package_container_prefix.clone(),
            data_dir: config.data_dir(),
            restart_script_path: config.restart_script_path(),
            docker_socket: config.docker_socket(),
            docker_binary: config.runtime.docker_binary.clone(),
            compose_command: config.compose_command().join(" "),
            helper_name: config.runtime.helper_name.clone(),
            helper_poll_timeout: config.helper_poll_timeout(),
            helper_poll_interval: config.helper_poll_interval(),
        }
    }

    /// Container name prefix used for a package's services
    #[must_use]
    pub fn container_prefix(&self, is_core: bool) -> &str {
        if is_core {
            &self.core_container_prefix
        } else {
            &self.package_container_prefix
        }
    }
}

/// Everything a pipeline stage needs, passed by reference to each stage
#[derive(Clone)]
pub struct InstallContext {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub store: StateStore,
    pub flags: Arc<InstallFlagTracker>,
    pub settings: InstallSettings,
    pub event_sender: Option<EventSender>,
}

impl std::fmt::Debug for InstallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EventEmitter for InstallContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl InstallContext {
    #[must_use]
    pub fn notifier(&self) -> CompletionNotifier {
        CompletionNotifier::new(Arc::clone(&self.flags), self.event_sender.clone())
    }
}
