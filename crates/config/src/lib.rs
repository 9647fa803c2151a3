#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for hearth
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/hearth/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;

use hearth_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// Identity of the orchestrator's own package and container naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_self_package_name")]
    pub self_package_name: String,
    #[serde(default = "default_self_container_name")]
    pub self_container_name: String,
    #[serde(default = "default_core_container_prefix")]
    pub core_container_prefix: String,
    #[serde(default = "default_package_container_prefix")]
    pub package_container_prefix: String,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub restart_script_path: Option<PathBuf>,
    pub docker_socket: Option<PathBuf>,
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
    /// Compose invocation, split on whitespace (e.g. `docker compose`)
    #[serde(default = "default_compose_command")]
    pub compose_command: String,
    /// Name of the container that performs the self restart
    #[serde(default = "default_helper_name")]
    pub helper_name: String,
    #[serde(default = "default_helper_poll_timeout")]
    pub helper_poll_timeout: u64, // seconds
    #[serde(default = "default_helper_poll_interval")]
    pub helper_poll_interval: u64, // seconds
}

/// Install pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_flag_timeout")]
    pub flag_timeout: u64, // seconds
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            self_package_name: default_self_package_name(),
            self_container_name: default_self_container_name(),
            core_container_prefix: default_core_container_prefix(),
            package_container_prefix: default_package_container_prefix(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
            compose_command: default_compose_command(),
            helper_name: default_helper_name(),
            helper_poll_timeout: default_helper_poll_timeout(),
            helper_poll_interval: default_helper_poll_interval(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            flag_timeout: default_flag_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            timeout: default_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

// Default value functions for serde
fn default_self_package_name() -> String {
    "hearth.dnp.core".to_string()
}

fn default_self_container_name() -> String {
    "HearthCore-hearth.dnp.core".to_string()
}

fn default_core_container_prefix() -> String {
    "HearthCore-".to_string()
}

fn default_package_container_prefix() -> String {
    "HearthPackage-".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_compose_command() -> String {
    "docker compose".to_string()
}

fn default_helper_name() -> String {
    constants::RESTART_HELPER_NAME.to_string()
}

fn default_helper_poll_timeout() -> u64 {
    60
}

fn default_helper_poll_interval() -> u64 {
    1
}

fn default_flag_timeout() -> u64 {
    300 // 5 minutes
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("hearth").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(name) = std::env::var("HEARTH_SELF_PACKAGE") {
            self.general.self_package_name = name;
        }

        if let Ok(name) = std::env::var("HEARTH_SELF_CONTAINER") {
            self.general.self_container_name = name;
        }

        if let Ok(dir) = std::env::var("HEARTH_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(path) = std::env::var("HEARTH_DB_PATH") {
            self.paths.db_path = Some(PathBuf::from(path));
        }

        if let Ok(binary) = std::env::var("HEARTH_DOCKER_BINARY") {
            self.runtime.docker_binary = binary;
        }

        if let Ok(gateway) = std::env::var("HEARTH_GATEWAY_URL") {
            self.network.gateway_url = gateway;
        }

        if let Ok(timeout) = std::env::var("HEARTH_NETWORK_TIMEOUT") {
            self.network.timeout = parse_env("HEARTH_NETWORK_TIMEOUT", timeout)?;
        }

        if let Ok(timeout) = std::env::var("HEARTH_FLAG_TIMEOUT") {
            self.install.flag_timeout = parse_env("HEARTH_FLAG_TIMEOUT", timeout)?;
        }

        Ok(())
    }

    /// Check values that serde cannot check on its own
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable gateway URL, an empty compose
    /// command or relative paths.
    pub fn validate(&self) -> Result<(), Error> {
        url::Url::parse(&self.network.gateway_url).map_err(|_| ConfigError::InvalidValue {
            field: "network.gateway_url".to_string(),
            value: self.network.gateway_url.clone(),
        })?;

        if self.compose_command().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runtime.compose_command".to_string(),
                value: self.runtime.compose_command.clone(),
            }
            .into());
        }

        for (field, path) in [
            ("paths.data_dir", self.data_dir()),
            ("paths.db_path", self.db_path()),
            ("paths.restart_script_path", self.restart_script_path()),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: path.display().to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Get the package data directory (with default)
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_DATA_DIR))
    }

    /// Get the database path (with default)
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_DB_PATH))
    }

    /// Get the helper script path; defaults to a file inside the data directory
    /// so the helper container sees it through its data mount
    #[must_use]
    pub fn restart_script_path(&self) -> PathBuf {
        self.paths
            .restart_script_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::RESTART_SCRIPT_NAME))
    }

    /// Get the runtime socket path (with default)
    #[must_use]
    pub fn docker_socket(&self) -> PathBuf {
        self.paths
            .docker_socket
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_DOCKER_SOCKET))
    }

    /// Compose invocation split into program and leading arguments
    #[must_use]
    pub fn compose_command(&self) -> Vec<String> {
        self.runtime
            .compose_command
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn helper_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.helper_poll_timeout)
    }

    #[must_use]
    pub fn helper_poll_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.helper_poll_interval.max(1))
    }

    #[must_use]
    pub fn flag_timeout(&self) -> Duration {
        Duration::from_secs(self.install.flag_timeout)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}
