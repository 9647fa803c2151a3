use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Byte-level progress of long running transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Progress tracking started
    Started {
        id: String,
        operation: String,
        total: Option<u64>,
    },

    /// Progress completed successfully
    Completed { id: String, duration: Duration },

    /// Progress failed
    Failed {
        id: String,
        failure: super::FailureContext,
    },
}

impl ProgressEvent {
    pub fn started(id: impl Into<String>, operation: impl Into<String>, total: Option<u64>) -> Self {
        Self::Started {
            id: id.into(),
            operation: operation.into(),
            total,
        }
    }

    pub fn completed(id: impl Into<String>, duration: Duration) -> Self {
        Self::Completed {
            id: id.into(),
            duration,
        }
    }

    pub fn failed(id: impl Into<String>, failure: super::FailureContext) -> Self {
        Self::Failed {
            id: id.into(),
            failure,
        }
    }
}
