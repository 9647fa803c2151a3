//! Structured logging for pipeline events
//!
//! Every event is logged at the level it declares, under a per-domain target,
//! with the fields an operator filters on.

use hearth_events::{AppEvent, InstallEvent, NotificationEvent, RuntimeEvent};
use tracing::{debug, error, info, trace, warn, Level};

/// Dispatch to the tracing macro matching a runtime level
macro_rules! log_at {
    ($level:expr, target: $target:literal, $($rest:tt)+) => {
        match $level {
            Level::ERROR => error!(target: $target, $($rest)+),
            Level::WARN => warn!(target: $target, $($rest)+),
            Level::INFO => info!(target: $target, $($rest)+),
            Level::DEBUG => debug!(target: $target, $($rest)+),
            _ => trace!(target: $target, $($rest)+),
        }
    };
}

/// Log an `AppEvent` through tracing with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    let level = event.log_level();
    match event {
        AppEvent::Install(install) => log_install_event(level, install),
        AppEvent::Notification(notification) => match notification {
            NotificationEvent::PackagesChanged { names } => {
                log_at!(level, target: "hearth::events::notification", packages = ?names, "Packages changed");
            }
            other => {
                log_at!(level, target: "hearth::events::notification", notification = ?other, "Notification");
            }
        },
        AppEvent::Runtime(RuntimeEvent::ProcessExecutionFailed {
            command,
            error_message,
            duration_ms,
        }) => {
            log_at!(
                level,
                target: "hearth::events::runtime",
                command = %command,
                duration_ms = duration_ms,
                error = %error_message,
                "Runtime command failed"
            );
        }
        AppEvent::Runtime(_) => {
            log_at!(level, target: "hearth::events::runtime", fields = %event.log_fields(), "Runtime event");
        }
        AppEvent::General(_) => {
            log_at!(level, target: "hearth::events::general", fields = %event.log_fields(), "General event");
        }
        AppEvent::Progress(_) => {
            log_at!(level, target: "hearth::events::progress", fields = %event.log_fields(), "Progress event");
        }
    }
}

fn log_install_event(level: Level, event: &InstallEvent) {
    match event {
        InstallEvent::BatchStarted { packages } => {
            log_at!(level, target: "hearth::events::install", packages = ?packages, "Install batch started");
        }
        InstallEvent::BatchCompleted { packages } => {
            log_at!(level, target: "hearth::events::install", packages = ?packages, "Install batch completed");
        }
        InstallEvent::BatchFailed { packages, failure } => {
            log_at!(
                level,
                target: "hearth::events::install",
                packages = ?packages,
                code = ?failure.code,
                retryable = failure.retryable,
                "Install batch failed: {}",
                failure.message
            );
        }
        InstallEvent::StageStarted { stage, packages } => {
            log_at!(level, target: "hearth::events::install", stage = %stage, packages = ?packages, "Stage started");
        }
        InstallEvent::StageCompleted { stage } => {
            log_at!(level, target: "hearth::events::install", stage = %stage, "Stage completed");
        }
        InstallEvent::StepFailed {
            stage,
            package,
            step,
            failure,
        } => {
            log_at!(
                level,
                target: "hearth::events::install",
                stage = %stage,
                package = %package,
                step = %step,
                "Step failed: {}",
                failure.message
            );
        }
        InstallEvent::SelfRestartLaunching {
            package,
            script_path,
        } => {
            log_at!(
                level,
                target: "hearth::events::install",
                package = %package,
                script = %script_path,
                "Launching self restart helper"
            );
        }
        InstallEvent::PendingRestartFound {
            helper,
            exit_code,
            packages,
        } => {
            log_at!(
                level,
                target: "hearth::events::install",
                helper = %helper,
                exit_code = exit_code,
                packages = ?packages,
                "Found pending self restart"
            );
        }
        InstallEvent::RollbackCompleted {
            packages,
            failed_steps,
        }
        | InstallEvent::CleanupCompleted {
            packages,
            failed_steps,
        } => {
            log_at!(
                level,
                target: "hearth::events::install",
                packages = ?packages,
                failed_steps = failed_steps,
                fields = %AppEvent::Install(event.clone()).log_fields(),
                "Post-install step finished"
            );
        }
        other => {
            log_at!(
                level,
                target: "hearth::events::install",
                fields = %AppEvent::Install(other.clone()).log_fields(),
                "Install event"
            );
        }
    }
}
