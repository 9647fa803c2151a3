//! `ContainerRuntime` over the docker CLI

use async_compression::tokio::bufread::XzDecoder;
use async_trait::async_trait;
use hearth_errors::{Error, RuntimeError};
use hearth_events::{AppEvent, EventEmitter, EventSender, RuntimeEvent};
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::Path;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio_util::io::SyncIoBridge;

use crate::process::{CommandOutput, PlatformCommand, ProcessOperations, TokioProcess};
use crate::runtime::{
    ComposeUpOptions, ContainerInspect, ContainerRuntime, ImageSummary, LayerProgress,
    LayerProgressSender,
};

const LOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Docker CLI driver
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker: String,
    compose: Vec<String>,
    process: TokioProcess,
    event_sender: Option<EventSender>,
}

impl DockerCli {
    /// Create a driver for `docker_binary` using `compose_command` (program
    /// followed by leading arguments, e.g. `["docker", "compose"]`)
    #[must_use]
    pub fn new(
        docker_binary: impl Into<String>,
        compose_command: Vec<String>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            docker: docker_binary.into(),
            compose: compose_command,
            process: TokioProcess::new(event_sender.clone()),
            event_sender,
        }
    }

    fn docker_command(&self) -> PlatformCommand {
        PlatformCommand::new(&self.docker)
    }

    fn compose_command(&self, compose_path: &Path) -> PlatformCommand {
        let (program, leading) = match self.compose.split_first() {
            Some((program, leading)) => (program.as_str(), leading),
            None => (self.docker.as_str(), &[][..]),
        };
        let mut cmd = PlatformCommand::new(program);
        if self.compose.is_empty() {
            cmd.arg("compose");
        }
        cmd.args(leading);
        cmd.arg("-f").arg(compose_path.display().to_string());
        cmd
    }

    async fn run(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error> {
        self.process.execute_command(cmd).await
    }
}

impl EventEmitter for DockerCli {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Arguments after `-f <file>` for `compose up`
#[must_use]
pub fn compose_up_args(options: &ComposeUpOptions) -> Vec<String> {
    let mut args = vec!["up".to_string()];
    if options.no_start {
        args.push("--no-start".to_string());
    } else {
        args.push("-d".to_string());
    }
    if let Some(timeout) = options.timeout {
        args.push("--timeout".to_string());
        args.push(timeout.to_string());
    }
    if options.force_recreate {
        args.push("--force-recreate".to_string());
    }
    args.extend(options.service_names.iter().cloned());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInspect {
    state: RawState,
    config: RawConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    running: bool,
    exit_code: i64,
    #[serde(default)]
    finished_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawImage {
    repository: String,
    tag: String,
    #[serde(rename = "ID")]
    id: String,
}

/// Parse `docker container inspect` output
///
/// # Errors
///
/// Returns an error when the output is not the expected JSON array.
pub fn parse_inspect(stdout: &str) -> Result<Option<ContainerInspect>, Error> {
    let raw: Vec<RawInspect> =
        serde_json::from_str(stdout).map_err(|e| RuntimeError::UnexpectedOutput {
            message: format!("container inspect: {e}"),
        })?;
    Ok(raw.into_iter().next().map(|raw| ContainerInspect {
        running: raw.state.running,
        exit_code: raw.state.exit_code,
        finished_at: raw.state.finished_at,
        image: raw.config.image,
    }))
}

/// Parse `docker image ls --format '{{json .}}'` output, one object per line
///
/// # Errors
///
/// Returns an error when a line is not a JSON image summary.
pub fn parse_image_list(stdout: &str) -> Result<Vec<ImageSummary>, Error> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let raw: RawImage =
                serde_json::from_str(line).map_err(|e| RuntimeError::UnexpectedOutput {
                    message: format!("image ls: {e}"),
                })?;
            Ok(ImageSummary {
                repository: raw.repository,
                tag: raw.tag,
                id: raw.id,
            })
        })
        .collect()
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

/// Passes every byte read through to a writer
struct TeeReader<R, W> {
    inner: R,
    out: W,
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.out.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// Decompress `reader` into `sink` while walking the tar entries to report
/// per-layer progress
fn feed_archive<R: Read, W: Write>(
    reader: R,
    sink: W,
    archive_name: &str,
    progress: Option<&LayerProgressSender>,
    events: Option<&EventSender>,
) -> std::io::Result<W> {
    let mut archive = tar::Archive::new(TeeReader {
        inner: reader,
        out: sink,
    });
    let mut buf = vec![0u8; LOAD_CHUNK_SIZE];

    for entry in archive.entries()? {
        let mut entry = entry?;
        let layer_id = entry.path()?.to_string_lossy().into_owned();
        let total = entry.size();
        let mut current = 0u64;
        loop {
            let n = entry.read(&mut buf)?;
            if n == 0 {
                break;
            }
            current += n as u64;
            if let Some(progress) = progress {
                let _ = progress.send(LayerProgress {
                    layer_id: layer_id.clone(),
                    current,
                    total,
                });
            }
        }
        if let Some(events) = events {
            events.emit(AppEvent::Runtime(RuntimeEvent::LayerLoaded {
                archive: archive_name.to_string(),
                layer_id,
                size: total,
            }));
        }
    }

    // Trailing blocks after the last entry still belong to the stream
    let mut tee = archive.into_inner();
    std::io::copy(&mut tee, &mut std::io::sink())?;
    tee.out.flush()?;
    Ok(tee.out)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn compose_up(
        &self,
        compose_path: &Path,
        options: &ComposeUpOptions,
    ) -> Result<(), Error> {
        let mut cmd = self.compose_command(compose_path);
        cmd.args(compose_up_args(options));
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(RuntimeError::ComposeFailed {
                action: "up".to_string(),
                compose_path: compose_path.display().to_string(),
                message: output.stderr_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn compose_rm(&self, compose_path: &Path) -> Result<(), Error> {
        let mut cmd = self.compose_command(compose_path);
        cmd.args(["rm", "--stop", "--force"]);
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(RuntimeError::ComposeFailed {
                action: "rm".to_string(),
                compose_path: compose_path.display().to_string(),
                message: output.stderr_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn image_load(
        &self,
        archive_path: &Path,
        progress: Option<LayerProgressSender>,
    ) -> Result<(), Error> {
        let load_failed = |message: String| -> Error {
            RuntimeError::ImageLoadFailed {
                path: archive_path.display().to_string(),
                message,
            }
            .into()
        };

        let file = tokio::fs::File::open(archive_path)
            .await
            .map_err(|e| Error::io_with_path(&e, archive_path))?;

        let mut child = tokio::process::Command::new(&self.docker)
            .arg("load")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::from(RuntimeError::CommandNotFound {
                        command: self.docker.clone(),
                    })
                } else {
                    load_failed(e.to_string())
                }
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| load_failed("stdin of docker load is not piped".to_string()))?;

        let reader = SyncIoBridge::new(XzDecoder::new(BufReader::new(file)));
        let writer = SyncIoBridge::new(stdin);
        let archive_name = archive_path.display().to_string();
        let events = self.event_sender.clone();

        let feed = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut writer =
                feed_archive(reader, writer, &archive_name, progress.as_ref(), events.as_ref())?;
            writer.shutdown()
        });

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| load_failed(e.to_string()))?;

        if !output.status.success() {
            return Err(load_failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        fed.map_err(|e| load_failed(format!("archive reader task failed: {e}")))?
            .map_err(|e| load_failed(e.to_string()))?;

        self.emit_debug(format!(
            "loaded {}: {}",
            archive_path.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        ));
        Ok(())
    }

    async fn image_list(&self, reference: &str) -> Result<Vec<ImageSummary>, Error> {
        let mut cmd = self.docker_command();
        cmd.args(["image", "ls", "--format", "{{json .}}", "--filter"])
            .arg(format!("reference={reference}"));
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(RuntimeError::ImageOperationFailed {
                reference: reference.to_string(),
                message: output.stderr_string(),
            }
            .into());
        }
        parse_image_list(&output.stdout_string())
    }

    async fn image_remove(&self, reference: &str) -> Result<(), Error> {
        let mut cmd = self.docker_command();
        cmd.args(["image", "rm", reference]);
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(RuntimeError::ImageOperationFailed {
                reference: reference.to_string(),
                message: output.stderr_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn container_inspect(&self, name: &str) -> Result<Option<ContainerInspect>, Error> {
        let mut cmd = self.docker_command();
        cmd.args(["container", "inspect", name]);
        let output = self.run(cmd).await?;
        if !output.success() {
            let stderr = output.stderr_string();
            if is_missing_container(&stderr) {
                return Ok(None);
            }
            return Err(RuntimeError::ContainerOperationFailed {
                container: name.to_string(),
                message: stderr,
            }
            .into());
        }
        parse_inspect(&output.stdout_string())
    }

    async fn container_remove(&self, name: &str) -> Result<(), Error> {
        let mut cmd = self.docker_command();
        cmd.args(["rm", "--force", name]);
        let output = self.run(cmd).await?;
        if !output.success() {
            let stderr = output.stderr_string();
            if is_missing_container(&stderr) {
                return Ok(());
            }
            return Err(RuntimeError::ContainerOperationFailed {
                container: name.to_string(),
                message: stderr,
            }
            .into());
        }
        Ok(())
    }

    async fn copy_to_container(
        &self,
        container: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), Error> {
        let copy_failed = |message: String| -> Error {
            RuntimeError::ContainerOperationFailed {
                container: container.to_string(),
                message,
            }
            .into()
        };

        let target = Path::new(path);
        let (Some(dir), Some(file_name)) = (target.parent(), target.file_name()) else {
            return Err(copy_failed(format!("invalid container path {path}")));
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new("/")
        } else {
            dir
        };

        let archive = single_file_tar(&file_name.to_string_lossy(), contents)
            .map_err(|e| copy_failed(e.to_string()))?;

        let mut cmd = self.docker_command();
        cmd.args(["cp", "-"])
            .arg(format!("{container}:{}", dir.display()))
            .stdin(archive);
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(copy_failed(output.stderr_string()));
        }
        Ok(())
    }

    async fn launch_blocking(&self, command: &str) -> Result<(), Error> {
        let mut cmd = PlatformCommand::new("sh");
        cmd.args(["-c", command]);
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(RuntimeError::ProcessExecutionFailed {
                command: command.to_string(),
                message: format!(
                    "exited with {}: {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    output.stderr_string()
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// In-memory tar stream holding one regular file, as read by `docker cp -`
///
/// # Errors
///
/// Returns an error if the tar header cannot be built.
pub fn single_file_tar(file_name: &str, contents: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, contents)?;
    builder.into_inner()
}
