//! In-memory record of packages with an install in flight
//!
//! A flag is set when a batch enters the pipeline and cleared on every exit.
//! Flags older than the advisory timeout are ignored, so a crash that skips
//! the clear heals itself.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct InstallFlagTracker {
    flags: DashMap<String, Instant>,
    timeout: Duration,
}

impl InstallFlagTracker {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            flags: DashMap::new(),
            timeout,
        }
    }

    /// Mark every name as installing now; re-flagging refreshes the instant
    pub fn flag_packages_are_installing<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Instant::now();
        for name in names {
            self.flags.insert(name.as_ref().to_string(), now);
        }
    }

    pub fn flag_packages_are_not_installing<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.flags.remove(name.as_ref());
        }
    }

    /// Whether `name` was flagged less than the timeout ago
    #[must_use]
    pub fn package_is_installing(&self, name: &str) -> bool {
        self.flags
            .get(name)
            .is_some_and(|flagged_at| flagged_at.elapsed() < self.timeout)
    }

    /// Names with a live flag, sorted
    #[must_use]
    pub fn installing_packages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .flags
            .iter()
            .filter(|entry| entry.value().elapsed() < self.timeout)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}
