//! Records kept in the durable store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Version;

/// What the store remembers about a successfully installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledMetadata {
    pub version: Version,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstalledMetadata {
    /// Record an install of `version` at `now`, keeping the first install time
    #[must_use]
    pub fn record(previous: Option<&InstalledMetadata>, version: Version, now: DateTime<Utc>) -> Self {
        Self {
            version,
            installed_at: previous.map_or(now, |prev| prev.installed_at),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_keeps_first_install_time() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let meta = InstalledMetadata::record(None, Version::new(1, 0, 0), first);
        assert_eq!(meta.installed_at, first);

        let updated = InstalledMetadata::record(Some(&meta), Version::new(1, 1, 0), later);
        assert_eq!(updated.installed_at, first);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.version, Version::new(1, 1, 0));
    }
}
