//! Fixed names and paths for hearth
//!
//! These values are part of the on-host contract with the restart helper and
//! the rest of the appliance, so they are not exposed via TOML configuration.

/// Name of the transient container that performs the self restart
pub const RESTART_HELPER_NAME: &str = "restart-helper";

/// File name of the rendered helper script, inside the data directory
pub const RESTART_SCRIPT_NAME: &str = ".restart-patch.sh";

pub const DEFAULT_DATA_DIR: &str = "/var/lib/hearth/packages";
pub const DEFAULT_DB_PATH: &str = "/var/lib/hearth/state.sqlite";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Key of the persisted self-restart batch in the durable store
pub const CORE_UPDATE_BATCH_KEY: &str = "core_update_batch";

/// Key prefix of per-package installed metadata in the durable store
pub const INSTALLED_METADATA_PREFIX: &str = "installed_metadata";
