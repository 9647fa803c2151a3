//! Read-only helpers over compose files

use hearth_errors::{Error, RuntimeError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeService {
    container_name: Option<String>,
}

/// Service name → explicit `container_name`, for every service in the file
pub type ServiceContainers = BTreeMap<String, Option<String>>;

/// Parse the services of a compose document
///
/// # Errors
///
/// Returns an error when the document is not valid compose YAML.
pub fn parse_service_containers(contents: &str, path: &Path) -> Result<ServiceContainers, Error> {
    let compose: ComposeFile =
        serde_yml::from_str(contents).map_err(|e| RuntimeError::InvalidCompose {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(compose
        .services
        .into_iter()
        .map(|(name, service)| (name, service.container_name))
        .collect())
}

/// Read the services of a compose file
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub async fn read_service_containers(path: &Path) -> Result<ServiceContainers, Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    parse_service_containers(&contents, path)
}

/// Container name for `service`: the explicit `container_name` if the
/// compose file sets one, otherwise `<prefix><service>.<dnp_name>`
#[must_use]
pub fn container_name_for(
    services: &ServiceContainers,
    service: &str,
    dnp_name: &str,
    prefix: &str,
) -> String {
    services
        .get(service)
        .and_then(Clone::clone)
        .unwrap_or_else(|| {
            if service == dnp_name {
                format!("{prefix}{dnp_name}")
            } else {
                format!("{prefix}{service}.{dnp_name}")
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = r"
version: '3.5'
services:
  api:
    image: 'a.dnp:0.1.0'
    container_name: HearthPackage-api.a.dnp
  worker:
    image: 'a.dnp:0.1.0'
";

    #[test]
    fn resolves_explicit_and_derived_names() {
        let services = parse_service_containers(COMPOSE, Path::new("c.yml")).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(
            container_name_for(&services, "api", "a.dnp", "HearthPackage-"),
            "HearthPackage-api.a.dnp"
        );
        assert_eq!(
            container_name_for(&services, "worker", "a.dnp", "HearthPackage-"),
            "HearthPackage-worker.a.dnp"
        );
        assert_eq!(
            container_name_for(&services, "a.dnp", "a.dnp", "HearthCore-"),
            "HearthCore-a.dnp"
        );
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let err = parse_service_containers("services: [", Path::new("c.yml")).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::InvalidCompose { .. })
        ));
    }
}
