use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::InventorySource;
use super::labels::{Labels, Provider};
use crate::errors::IntegrationError;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const INGRESS_PATH: &str = "/apis/networking.k8s.io/v1/ingresses";

#[derive(Debug, Deserialize)]
struct IngressList {
    #[serde(default)]
    items: Vec<Ingress>,
}

#[derive(Debug, Deserialize)]
struct Ingress {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    annotations: Option<HashMap<String, String>>,
}

/// Ingresses across all namespaces, read with the pod's service account.
pub struct KubernetesSource {
    credentials_dir: PathBuf,
}

impl Default for KubernetesSource {
    fn default() -> Self {
        Self::in_cluster()
    }
}

impl KubernetesSource {
    pub fn in_cluster() -> Self {
        Self {
            credentials_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }

    /// API server address from `KUBERNETES_SERVICE_HOST` and `KUBERNETES_SERVICE_PORT`.
    fn api_server() -> Result<String, IntegrationError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            IntegrationError::NotInCluster("KUBERNETES_SERVICE_HOST is unset".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };
        Ok(format!("https://{}:{}", host, port))
    }

    fn client(&self) -> Result<(reqwest::Client, String), IntegrationError> {
        let dir: &Path = &self.credentials_dir;
        let token = std::fs::read_to_string(dir.join("token"))
            .map_err(|e| IntegrationError::NotInCluster(format!("service account token: {}", e)))?;
        let ca = std::fs::read(dir.join("ca.crt"))
            .map_err(|e| IntegrationError::NotInCluster(format!("service account CA: {}", e)))?;
        let cert =
            reqwest::Certificate::from_pem(&ca).map_err(IntegrationError::KubernetesRequest)?;
        let client = reqwest::Client::builder()
            .add_root_certificate(cert)
            .build()
            .map_err(IntegrationError::KubernetesRequest)?;
        Ok((client, token.trim().to_string()))
    }
}

#[async_trait]
impl InventorySource for KubernetesSource {
    fn provider(&self) -> Provider {
        Provider::Kubernetes
    }

    async fn fetch(&self) -> Result<Vec<Labels>, IntegrationError> {
        let api_server = Self::api_server()?;
        let (client, token) = self.client()?;
        let list: IngressList = client
            .get(format!("{}{}", api_server, INGRESS_PATH))
            .bearer_auth(token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(IntegrationError::KubernetesRequest)?
            .json()
            .await
            .map_err(IntegrationError::KubernetesRequest)?;
        Ok(annotations(list))
    }
}

fn annotations(list: IngressList) -> Vec<Labels> {
    list.items
        .into_iter()
        .filter_map(|ingress| ingress.metadata.annotations)
        .filter(|a| !a.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::labels::parse_declarations;

    #[test]
    fn test_ingress_list_annotations() {
        let list: IngressList = serde_json::from_value(serde_json::json!({
            "kind": "IngressList",
            "items": [
                {
                    "metadata": {
                        "name": "grafana",
                        "annotations": {
                            "flame.pawelmalak/type": "app",
                            "flame.pawelmalak/name": "Grafana",
                            "flame.pawelmalak/url": "https://grafana.k8s.lan"
                        }
                    }
                },
                { "metadata": { "name": "bare" } },
                { "metadata": { "name": "empty", "annotations": {} } }
            ]
        }))
        .unwrap();

        let sets = annotations(list);
        assert_eq!(sets.len(), 1);
        let decls = parse_declarations(&sets[0], Provider::Kubernetes);
        assert_eq!(decls[0].name, "Grafana");
        assert_eq!(decls[0].icon, "kubernetes");
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let source = KubernetesSource {
            credentials_dir: PathBuf::from("/nonexistent/serviceaccount"),
        };
        assert!(matches!(
            source.client(),
            Err(IntegrationError::NotInCluster(_))
        ));
    }
}
