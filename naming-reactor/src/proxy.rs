use std::collections::HashMap;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use crate::config::ServerConfig;

const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";
const INSTANCE_LIST_MULTI_PATH: &str = "/nacos/v1/ns/instance/list/multi";
const CATALOG_SERVICES_PATH: &str = "/nacos/v1/ns/catalog/services";

/// Query side of the naming backend. Every call returns the raw payload text;
/// parsing is left to the reactor.
#[async_trait]
pub trait NamingProxy: Send + Sync {
    /// One service document for `(service_name, clusters)`.
    async fn query_list(
        &self,
        service_name: &str,
        clusters: &str,
        udp_port: u16,
        healthy_only: bool,
    ) -> Result<String>;

    /// JSON array of service documents (each as a string) for a comma-joined
    /// list of service names.
    async fn query_list_multi_group(
        &self,
        service_names: &str,
        clusters: &HashMap<String, String>,
        udp_port: u16,
        healthy_only: bool,
        find_back: bool,
    ) -> Result<String>;

    /// JSON array of every service document in a namespace and group.
    async fn get_all_service_info_list(
        &self,
        namespace: &str,
        group: &str,
        clusters: &str,
    ) -> Result<String>;
}

/// `NamingProxy` speaking the backend's HTTP API.
pub struct HttpNamingProxy {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
}

impl HttpNamingProxy {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned {}", url, status);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))
    }
}

#[async_trait]
impl NamingProxy for HttpNamingProxy {
    async fn query_list(
        &self,
        service_name: &str,
        clusters: &str,
        udp_port: u16,
        healthy_only: bool,
    ) -> Result<String> {
        self.get(
            INSTANCE_LIST_PATH,
            &[
                ("namespaceId", self.namespace.clone()),
                ("serviceName", service_name.to_string()),
                ("clusters", clusters.to_string()),
                ("udpPort", udp_port.to_string()),
                ("healthyOnly", healthy_only.to_string()),
            ],
        )
        .await
    }

    async fn query_list_multi_group(
        &self,
        service_names: &str,
        clusters: &HashMap<String, String>,
        udp_port: u16,
        healthy_only: bool,
        find_back: bool,
    ) -> Result<String> {
        let clusters = serde_json::to_string(clusters)
            .context("Failed to serialize clusters map")?;

        self.get(
            INSTANCE_LIST_MULTI_PATH,
            &[
                ("namespaceId", self.namespace.clone()),
                ("serviceNames", service_names.to_string()),
                ("clusters", clusters),
                ("udpPort", udp_port.to_string()),
                ("healthyOnly", healthy_only.to_string()),
                ("findBack", find_back.to_string()),
            ],
        )
        .await
    }

    async fn get_all_service_info_list(
        &self,
        namespace: &str,
        group: &str,
        clusters: &str,
    ) -> Result<String> {
        self.get(
            CATALOG_SERVICES_PATH,
            &[
                ("namespaceId", namespace.to_string()),
                ("groupName", group.to_string()),
                ("clusters", clusters.to_string()),
            ],
        )
        .await
    }
}
