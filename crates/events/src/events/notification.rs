//! Notifications for the rest of the appliance

use serde::{Deserialize, Serialize};

/// Fire-and-forget notifications published when an install settles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    /// Port mappings should be reconciled against the new containers
    RunPortReconciliation,
    /// Cached package listings are stale
    PackageListInvalidate,
    /// The given packages changed on this host
    PackagesChanged { names: Vec<String> },
}
