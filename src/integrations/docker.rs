use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::ListContainersOptions;

use super::InventorySource;
use super::labels::{Labels, Provider};
use crate::errors::IntegrationError;

const SOCKET_TIMEOUT_SECS: u64 = 120;

/// Running containers from the Docker Engine API.
///
/// A host containing `localhost` is reached over the local unix socket;
/// anything else over plain HTTP.
pub struct DockerSource {
    host: String,
}

impl DockerSource {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn connect(&self) -> Result<Docker, IntegrationError> {
        let result = if self.host.contains("localhost") {
            Docker::connect_with_socket_defaults()
        } else {
            let addr = if self.host.contains("://") {
                self.host.clone()
            } else {
                format!("http://{}", self.host)
            };
            Docker::connect_with_http(&addr, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        };
        result.map_err(|source| IntegrationError::DockerUnavailable {
            host: self.host.clone(),
            source,
        })
    }
}

#[async_trait]
impl InventorySource for DockerSource {
    fn provider(&self) -> Provider {
        Provider::Docker
    }

    async fn fetch(&self) -> Result<Vec<Labels>, IntegrationError> {
        let docker = self.connect()?;
        // Default options list running containers only.
        let containers = docker
            .list_containers(None::<ListContainersOptions>)
            .await
            .map_err(|source| IntegrationError::DockerUnavailable {
                host: self.host.clone(),
                source,
            })?;
        Ok(containers
            .into_iter()
            .filter_map(|c| c.labels)
            .filter(|labels| !labels.is_empty())
            .map(|labels| labels.into_iter().collect())
            .collect())
    }
}
