#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package installation pipeline for hearth
//!
//! A batch of packages is downloaded and verified, loaded into the container
//! runtime and started, or reverted as a whole. Updating the orchestrator's
//! own package hands the last step to a restart helper container and is
//! completed by [`Installer::post_restart_patch`] on the next start.

pub mod acquisition;
pub mod activation;
pub mod archive;
pub mod cleanup;
pub mod containers;
mod context;
pub mod flags;
mod installer;
pub mod notifier;
pub mod restart;
pub mod rollback;

pub use context::{InstallContext, InstallSettings};
pub use flags::InstallFlagTracker;
pub use installer::Installer;
pub use notifier::CompletionNotifier;

// Re-export EventSender for callers wiring a context
pub use hearth_events::EventSender;
