//! Typed access to the durable key/value records

use hearth_config::constants::{CORE_UPDATE_BATCH_KEY, INSTALLED_METADATA_PREFIX};
use hearth_errors::{Error, StateError};
use hearth_types::{InstalledMetadata, PackageInstallState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::path::Path;

use crate::queries;

/// Durable store shared by the install pipeline
///
/// Every write is a single committed transaction, so a value read back after
/// a crash is either the previous or the new document, never a mix.
#[derive(Clone)]
pub struct StateStore {
    pool: Pool<Sqlite>,
}

impl StateStore {
    /// Open (creating if needed) the database at `db_path` and migrate it
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(db_path: &Path) -> Result<Self, Error> {
        let pool = crate::create_pool(db_path).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already migrated pool
    #[must_use]
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The batch persisted before a self restart, if any
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or when the stored document does
    /// not decode.
    pub async fn core_update_batch(&self) -> Result<Option<Vec<PackageInstallState>>, Error> {
        self.get_json(CORE_UPDATE_BATCH_KEY).await
    }

    /// Persist the batch that the restart helper will complete
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be encoded or written.
    pub async fn set_core_update_batch(&self, batch: &[PackageInstallState]) -> Result<(), Error> {
        self.set_json(CORE_UPDATE_BATCH_KEY, &batch).await
    }

    /// Remove the persisted batch
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn clear_core_update_batch(&self) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        queries::delete_value(&mut tx, CORE_UPDATE_BATCH_KEY).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Metadata recorded for an installed package
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or a corrupted record.
    pub async fn installed_metadata(&self, dnp_name: &str) -> Result<Option<InstalledMetadata>, Error> {
        self.get_json(&metadata_key(dnp_name)).await
    }

    /// Record metadata for an installed package
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub async fn set_installed_metadata(
        &self,
        dnp_name: &str,
        metadata: &InstalledMetadata,
    ) -> Result<(), Error> {
        self.set_json(&metadata_key(dnp_name), metadata).await
    }

    /// Names of every package with recorded metadata, sorted
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn installed_packages(&self) -> Result<Vec<String>, Error> {
        let prefix = metadata_key("");
        let mut tx = self.pool.begin().await?;
        let keys = queries::keys_with_prefix(&mut tx, &prefix).await?;
        tx.commit().await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let mut tx = self.pool.begin().await?;
        let raw = queries::get_value(&mut tx, key).await?;
        tx.commit().await?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                StateError::StateCorrupted {
                    key: key.to_string(),
                    message: e.to_string(),
                }
                .into()
            })
        })
        .transpose()
    }

    async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        let mut tx = self.pool.begin().await?;
        queries::set_value(&mut tx, key, &raw).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn metadata_key(dnp_name: &str) -> String {
    format!("{INSTALLED_METADATA_PREFIX}.{dnp_name}")
}
