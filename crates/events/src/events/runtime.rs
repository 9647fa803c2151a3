//! Container runtime driver events

use serde::{Deserialize, Serialize};

/// Events describing commands run against the container runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// Process execution started
    ProcessExecutionStarted {
        /// Command being executed
        command: String,
        /// Command arguments
        args: Vec<String>,
    },

    /// Process execution completed
    ProcessExecutionCompleted {
        /// Command that was executed
        command: String,
        /// Exit code, absent when killed by a signal
        exit_code: Option<i32>,
        /// Duration of execution in milliseconds
        duration_ms: u64,
    },

    /// Process could not be spawned or awaited
    ProcessExecutionFailed {
        command: String,
        error_message: String,
        duration_ms: u64,
    },

    /// A layer reported by the runtime while loading an image archive
    LayerLoaded {
        archive: String,
        layer_id: String,
        size: u64,
    },
}
