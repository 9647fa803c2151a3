#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Host integration for hearth
//!
//! This crate provides:
//! - The `ContainerRuntime` trait the install pipeline drives
//! - `DockerCli`, its implementation over the docker CLI
//! - Process execution with event emission
//! - Compose file and filesystem helpers

pub mod compose;
pub mod docker;
pub mod fs;
pub mod process;
pub mod runtime;

pub use docker::DockerCli;
pub use process::{CommandOutput, PlatformCommand, ProcessOperations, TokioProcess};
pub use runtime::{
    ComposeUpOptions, ContainerInspect, ContainerRuntime, ImageSummary, LayerProgress,
    LayerProgressSender,
};
