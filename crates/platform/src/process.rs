//! Process execution with event emission

use async_trait::async_trait;
use hearth_errors::{Error, RuntimeError};
use hearth_events::{AppEvent, EventEmitter, EventSender, RuntimeEvent};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Command builder for processes run on the host
#[derive(Debug, Clone)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl PlatformCommand {
    /// Create a new platform command
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Bytes written to the process' standard input before it is closed
    pub fn stdin(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.stdin = Some(bytes);
        self
    }

    /// Get the program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the arguments
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the current directory
    #[must_use]
    pub fn get_current_dir(&self) -> Option<&PathBuf> {
        self.current_dir.as_ref()
    }

    /// Program and arguments joined for messages
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from command execution
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Trait for process execution operations
#[async_trait]
pub trait ProcessOperations: Send + Sync {
    /// Execute a command and return the output
    ///
    /// A non-zero exit status is not an error here; callers decide.
    async fn execute_command(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error>;
}

/// `tokio::process` backed executor
#[derive(Debug, Clone, Default)]
pub struct TokioProcess {
    event_sender: Option<EventSender>,
}

impl TokioProcess {
    #[must_use]
    pub fn new(event_sender: Option<EventSender>) -> Self {
        Self { event_sender }
    }
}

impl EventEmitter for TokioProcess {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ProcessOperations for TokioProcess {
    async fn execute_command(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error> {
        let start = Instant::now();
        self.emit(AppEvent::Runtime(RuntimeEvent::ProcessExecutionStarted {
            command: cmd.program().to_string(),
            args: cmd.get_args().to_vec(),
        }));

        let result: Result<CommandOutput, RuntimeError> = async {
            let mut command = Command::new(cmd.program());
            command
                .args(cmd.get_args())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(if cmd.stdin.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                });

            if let Some(dir) = cmd.get_current_dir() {
                command.current_dir(dir);
            }

            let mut child = command.spawn().map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::CommandNotFound {
                        command: cmd.program().to_string(),
                    }
                } else {
                    RuntimeError::ProcessExecutionFailed {
                        command: cmd.display(),
                        message: e.to_string(),
                    }
                }
            })?;

            if let (Some(bytes), Some(mut stdin)) = (cmd.stdin.as_ref(), child.stdin.take()) {
                let write = async {
                    stdin.write_all(bytes).await?;
                    stdin.shutdown().await
                };
                // A process may exit without reading its input; its status reports that
                if let Err(e) = write.await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(RuntimeError::ProcessExecutionFailed {
                            command: cmd.display(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            let output =
                child
                    .wait_with_output()
                    .await
                    .map_err(|e| RuntimeError::ProcessExecutionFailed {
                        command: cmd.display(),
                        message: e.to_string(),
                    })?;

            Ok(CommandOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
        .await;

        let duration_ms = duration_to_millis(start.elapsed());
        match &result {
            Ok(output) => self.emit(AppEvent::Runtime(RuntimeEvent::ProcessExecutionCompleted {
                command: cmd.program().to_string(),
                exit_code: output.status.code(),
                duration_ms,
            })),
            Err(e) => self.emit(AppEvent::Runtime(RuntimeEvent::ProcessExecutionFailed {
                command: cmd.program().to_string(),
                error_message: e.to_string(),
                duration_ms,
            })),
        }

        result.map_err(Error::from)
    }
}
