//! Completion notifications published when a batch settles

use hearth_events::{AppEvent, EventEmitter, EventSender, NotificationEvent};
use std::sync::Arc;

use crate::flags::InstallFlagTracker;

/// Clears install flags and tells the rest of the appliance what changed
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    flags: Arc<InstallFlagTracker>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for CompletionNotifier {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl CompletionNotifier {
    #[must_use]
    pub fn new(flags: Arc<InstallFlagTracker>, event_sender: Option<EventSender>) -> Self {
        Self {
            flags,
            event_sender,
        }
    }

    /// Fire and forget; runs after every batch whatever its outcome
    pub fn after_install(&self, names: &[String]) {
        self.flags.flag_packages_are_not_installing(names);
        self.emit(AppEvent::Notification(NotificationEvent::RunPortReconciliation));
        self.emit(AppEvent::Notification(NotificationEvent::PackageListInvalidate));
        self.emit(AppEvent::Notification(NotificationEvent::PackagesChanged {
            names: names.to_vec(),
        }));
    }
}
