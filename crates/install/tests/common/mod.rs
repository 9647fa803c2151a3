//! Fakes and fixtures shared by the pipeline tests
#![allow(dead_code)]

use async_compression::tokio::write::XzEncoder;
use async_trait::async_trait;
use hearth_config::Config;
use hearth_errors::{Error, NetworkError, RuntimeError};
use hearth_events::{AppEvent, EventReceiver, InstallEvent, NotificationEvent};
use hearth_hash::Hash;
use hearth_install::{InstallContext, InstallFlagTracker, InstallSettings};
use hearth_net::{ContentFetcher, DownloadResult, FetchProgress, ProgressFn};
use hearth_platform::{
    ComposeUpOptions, ContainerInspect, ContainerRuntime, ImageSummary, LayerProgress,
    LayerProgressSender,
};
use hearth_state::StateStore;
use hearth_types::{DistributedFile, PackageInstallState, Version};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

pub const SELF_PACKAGE: &str = "hearth.dnp.core";
pub const HELPER: &str = "restart-helper";

/// Ordered record of what the fakes did, shared between them
pub type Timeline = Arc<Mutex<Vec<String>>>;

pub fn entries(timeline: &Timeline) -> Vec<String> {
    timeline.lock().unwrap().clone()
}

/// Position of the first timeline entry starting with `prefix`
pub fn position(timeline: &[String], prefix: &str) -> Option<usize> {
    timeline.iter().position(|entry| entry.starts_with(prefix))
}

/// Calls received by the fake runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ComposeUp(PathBuf, ComposeUpOptions),
    ComposeRm(PathBuf),
    ImageLoad(PathBuf),
    ImageList(String),
    ImageRemove(String),
    Inspect(String),
    ContainerRemove(String),
    Copy {
        container: String,
        path: String,
        contents: Vec<u8>,
    },
    Launch(String),
}

fn dnp_of(compose_path: &Path) -> String {
    compose_path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// In-memory container runtime
pub struct FakeRuntime {
    pub timeline: Timeline,
    pub calls: Mutex<Vec<Call>>,
    /// Compose files whose `up` fails
    pub failing_compose: Mutex<HashSet<PathBuf>>,
    /// Inspect answers per container; the last answer repeats
    pub containers: Mutex<HashMap<String, VecDeque<ContainerInspect>>>,
    pub images: Mutex<Vec<ImageSummary>>,
    pub launch_error: Mutex<Option<String>>,
    /// Helper container left behind by the launch, as `docker run` does
    pub helper_after_launch: Mutex<Option<ContainerInspect>>,
}

impl FakeRuntime {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            calls: Mutex::new(Vec::new()),
            failing_compose: Mutex::new(HashSet::new()),
            containers: Mutex::new(HashMap::new()),
            images: Mutex::new(Vec::new()),
            launch_error: Mutex::new(None),
            helper_after_launch: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, entry: String) {
        self.calls.lock().unwrap().push(call);
        self.timeline.lock().unwrap().push(entry);
    }

    pub fn set_container(&self, name: &str, answers: Vec<ContainerInspect>) {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), answers.into());
    }
}

pub fn exited(exit_code: i64) -> ContainerInspect {
    ContainerInspect {
        running: false,
        exit_code,
        finished_at: Some("2024-05-01T10:00:00Z".to_string()),
        image: "hearth.dnp.core:0.1.0".to_string(),
    }
}

pub fn running() -> ContainerInspect {
    ContainerInspect {
        running: true,
        exit_code: 0,
        finished_at: None,
        image: "hearth.dnp.core:0.1.0".to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn compose_up(&self, compose_path: &Path, options: &ComposeUpOptions) -> Result<(), Error> {
        let kind = if options.no_start { "create" } else { "up" };
        self.record(
            Call::ComposeUp(compose_path.to_path_buf(), options.clone()),
            format!("{kind}:{}", dnp_of(compose_path)),
        );
        if self.failing_compose.lock().unwrap().contains(compose_path) {
            return Err(RuntimeError::ComposeFailed {
                action: "up".to_string(),
                compose_path: compose_path.display().to_string(),
                message: "port already allocated".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn compose_rm(&self, compose_path: &Path) -> Result<(), Error> {
        self.record(
            Call::ComposeRm(compose_path.to_path_buf()),
            format!("rm:{}", dnp_of(compose_path)),
        );
        Ok(())
    }

    async fn image_load(
        &self,
        archive_path: &Path,
        progress: Option<LayerProgressSender>,
    ) -> Result<(), Error> {
        self.record(
            Call::ImageLoad(archive_path.to_path_buf()),
            format!("load:{}", dnp_of(archive_path)),
        );
        if let Some(progress) = progress {
            for current in [5, 10] {
                let _ = progress.send(LayerProgress {
                    layer_id: "l1/layer.tar".to_string(),
                    current,
                    total: 10,
                });
            }
        }
        Ok(())
    }

    async fn image_list(&self, reference: &str) -> Result<Vec<ImageSummary>, Error> {
        self.record(Call::ImageList(reference.to_string()), format!("images:{reference}"));
        Ok(self
            .images
            .lock()
            .unwrap()
            .iter()
            .filter(|image| image.repository == reference)
            .cloned()
            .collect())
    }

    async fn image_remove(&self, reference: &str) -> Result<(), Error> {
        self.record(Call::ImageRemove(reference.to_string()), format!("rmi:{reference}"));
        self.images
            .lock()
            .unwrap()
            .retain(|image| image.reference() != reference);
        Ok(())
    }

    async fn container_inspect(&self, name: &str) -> Result<Option<ContainerInspect>, Error> {
        self.record(Call::Inspect(name.to_string()), format!("inspect:{name}"));
        let mut containers = self.containers.lock().unwrap();
        let Some(answers) = containers.get_mut(name) else {
            return Ok(None);
        };
        if answers.len() > 1 {
            Ok(answers.pop_front())
        } else {
            Ok(answers.front().cloned())
        }
    }

    async fn container_remove(&self, name: &str) -> Result<(), Error> {
        self.record(Call::ContainerRemove(name.to_string()), format!("remove:{name}"));
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn copy_to_container(&self, container: &str, path: &str, contents: &[u8]) -> Result<(), Error> {
        self.record(
            Call::Copy {
                container: container.to_string(),
                path: path.to_string(),
                contents: contents.to_vec(),
            },
            format!("copy:{container}:{path}"),
        );
        Ok(())
    }

    async fn launch_blocking(&self, command: &str) -> Result<(), Error> {
        self.record(Call::Launch(command.to_string()), "launch".to_string());
        if let Some(helper) = self.helper_after_launch.lock().unwrap().clone() {
            self.set_container(HELPER, vec![helper]);
        }
        match self.launch_error.lock().unwrap().clone() {
            Some(message) => Err(RuntimeError::ProcessExecutionFailed {
                command: command.to_string(),
                message,
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Serves archives from memory, keyed by descriptor source
pub struct FakeFetcher {
    pub timeline: Timeline,
    pub archives: Mutex<HashMap<String, Vec<u8>>>,
    pub delays: Mutex<HashMap<String, Duration>>,
}

impl FakeFetcher {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            archives: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    pub fn serve(&self, source: &str, archive: Vec<u8>) {
        self.archives
            .lock()
            .unwrap()
            .insert(source.to_string(), archive);
    }

    pub fn delay(&self, source: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(source.to_string(), delay);
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(
        &self,
        file: &DistributedFile,
        dest: &Path,
        on_progress: &ProgressFn,
    ) -> Result<DownloadResult, Error> {
        let delay = self.delays.lock().unwrap().get(&file.source).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let archive = self.archives.lock().unwrap().get(&file.source).cloned();
        let Some(bytes) = archive else {
            return Err(NetworkError::HttpError {
                status: 404,
                message: format!("{} not found", file.source),
            }
            .into());
        };

        tokio::fs::write(dest, &bytes).await?;
        on_progress(FetchProgress {
            received: bytes.len() as u64,
            total: Some(bytes.len() as u64),
        });
        self.timeline
            .lock()
            .unwrap()
            .push(format!("fetched:{}", dnp_of(dest)));

        Ok(DownloadResult {
            source: file.source.clone(),
            size: bytes.len() as u64,
            hash: Hash::from_data(&bytes),
        })
    }
}

/// An xz-compressed `docker save` archive tagged `tag`
pub async fn image_archive(tag: &str) -> Vec<u8> {
    let manifest =
        format!(r#"[{{"Config":"cfg.json","RepoTags":["{tag}"],"Layers":["l1/layer.tar"]}}]"#);
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [
        ("l1/layer.tar", b"layer bytes".as_slice()),
        ("cfg.json", b"{}".as_slice()),
        ("manifest.json", manifest.as_bytes()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = XzEncoder::new(Vec::new());
    encoder.write_all(&tar).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

pub struct Harness {
    pub temp: TempDir,
    pub timeline: Timeline,
    pub runtime: Arc<FakeRuntime>,
    pub fetcher: Arc<FakeFetcher>,
    pub ctx: InstallContext,
    pub events: EventReceiver,
}

pub const OLD_COMPOSE: &str = "services:\n  app:\n    image: app:old\n";
pub const OLD_MANIFEST: &str = r#"{"version":"old"}"#;

impl Harness {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let timeline: Timeline = Arc::default();
        let runtime = Arc::new(FakeRuntime::new(Arc::clone(&timeline)));
        let fetcher = Arc::new(FakeFetcher::new(Arc::clone(&timeline)));
        let store = StateStore::open(&temp.path().join("state.sqlite"))
            .await
            .unwrap();
        let (tx, events) = hearth_events::channel();

        let mut config = Config::default();
        config.paths.data_dir = Some(temp.path().join("packages"));
        config.paths.docker_socket = Some(temp.path().join("docker.sock"));
        let mut settings = InstallSettings::from_config(&config);
        settings.helper_poll_interval = Duration::from_millis(10);
        settings.helper_poll_timeout = Duration::from_millis(200);

        let ctx = InstallContext {
            runtime: Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            fetcher: Arc::clone(&fetcher) as Arc<dyn ContentFetcher>,
            store,
            flags: Arc::new(InstallFlagTracker::new(Duration::from_secs(300))),
            settings,
            event_sender: Some(tx),
        };

        Self {
            temp,
            timeline,
            runtime,
            fetcher,
            ctx,
            events,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.ctx.settings.data_dir.clone()
    }

    /// A package with its new compose and manifest on disk, plus backups of
    /// the previous release when `is_update`
    pub async fn package(&self, name: &str, version: &str, is_update: bool) -> PackageInstallState {
        let version = Version::parse(version).unwrap();
        let source = format!("/ipfs/Qm{}", name.replace('.', ""));
        let mut state = PackageInstallState::from_layout(
            &self.data_dir(),
            name,
            version,
            DistributedFile {
                source,
                hash: "QmNotABlake3Digest".to_string(),
                size: 0,
            },
        );
        state.is_update = is_update;
        state.is_core = name == SELF_PACKAGE;

        let dir = state.compose_path.parent().unwrap().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            &state.compose_path,
            format!("services:\n  {name}:\n    image: {}\n", state.image_tag()),
        )
        .await
        .unwrap();
        tokio::fs::write(&state.manifest_path, format!(r#"{{"version":"{}"}}"#, state.sem_version))
            .await
            .unwrap();
        if is_update {
            tokio::fs::write(&state.compose_backup_path, OLD_COMPOSE)
                .await
                .unwrap();
            tokio::fs::write(&state.manifest_backup_path, OLD_MANIFEST)
                .await
                .unwrap();
        }
        state
    }

    /// Serve a correctly tagged archive for `state`
    pub async fn serve_good(&self, state: &PackageInstallState) {
        self.fetcher
            .serve(&state.image_file.source, image_archive(&state.image_tag()).await);
    }

    pub fn drain_events(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn install_events(events: &[AppEvent]) -> Vec<&InstallEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Install(event) => Some(event),
            _ => None,
        })
        .collect()
}

pub fn notifications(events: &[AppEvent]) -> Vec<&NotificationEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Notification(event) => Some(event),
            _ => None,
        })
        .collect()
}
