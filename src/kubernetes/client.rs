// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant cluster client creation and kubeconfig utilities

use crate::error::{Result, SeedkeeperError};
use crate::types::cluster::Cluster;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{config::KubeConfigOptions, Api, Client, Config as KConfig, ResourceExt};
use tracing::{debug, info, instrument};

/// Secret in the cluster namespace holding the admin kubeconfig
pub const ADMIN_KUBECONFIG_SECRET: &str = "admin-kubeconfig";
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Access to the API of a tenant cluster
#[async_trait]
pub trait KubeconfigProvider: Send + Sync {
    /// Raw admin kubeconfig of the tenant cluster
    async fn admin_kubeconfig(&self, cluster: &Cluster) -> Result<Vec<u8>>;

    /// A client talking to the tenant cluster
    async fn client(&self, cluster: &Cluster) -> Result<Client>;
}

/// Reads tenant kubeconfigs from the admin-kubeconfig secret in the seed
pub struct SecretKubeconfigProvider {
    seed_client: Client,
    testing_mode: bool,
}

impl SecretKubeconfigProvider {
    pub fn new(seed_client: Client, testing_mode: bool) -> Self {
        Self {
            seed_client,
            testing_mode,
        }
    }
}

#[async_trait]
impl KubeconfigProvider for SecretKubeconfigProvider {
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    async fn admin_kubeconfig(&self, cluster: &Cluster) -> Result<Vec<u8>> {
        let cluster_name = cluster.name_any();
        let namespace = cluster.namespace_name();
        let secrets: Api<Secret> = Api::namespaced(self.seed_client.clone(), &namespace);

        debug!(
            "Getting kubeconfig secret '{}/{}' for cluster '{}'...",
            namespace, ADMIN_KUBECONFIG_SECRET, cluster_name
        );

        let secret = secrets.get(ADMIN_KUBECONFIG_SECRET).await.map_err(|e| {
            SeedkeeperError::KubeconfigError(format!(
                "Failed to get kubeconfig secret for cluster {}: {}",
                cluster_name, e
            ))
        })?;

        let Some(data) = secret.data.as_ref() else {
            return Err(SeedkeeperError::KubeconfigError(format!(
                "Kubeconfig secret for cluster {} has no data",
                cluster_name
            )));
        };

        let Some(kubeconfig) = data.get(KUBECONFIG_KEY) else {
            return Err(SeedkeeperError::KubeconfigError(format!(
                "Kubeconfig secret for cluster {} does not contain '{}' key",
                cluster_name, KUBECONFIG_KEY
            )));
        };

        Ok(kubeconfig.0.clone())
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    async fn client(&self, cluster: &Cluster) -> Result<Client> {
        if self.testing_mode {
            return create_testing_client().await;
        }
        let kubeconfig = self.admin_kubeconfig(cluster).await?;
        let client = create_client_from_kubeconfig(&kubeconfig).await?;
        info!("Created tenant client for cluster {}", cluster.name_any());
        Ok(client)
    }
}

/// Create a client for testing mode from the local kubeconfig
async fn create_testing_client() -> Result<Client> {
    let config = KConfig::infer()
        .await
        .map_err(|e| SeedkeeperError::KubeconfigError(format!("Failed to infer config: {}", e)))?;

    Client::try_from(config)
        .map_err(|e| SeedkeeperError::KubeconfigError(format!("Failed to create client: {}", e)))
}

/// Create a Kubernetes client from raw kubeconfig bytes
pub async fn create_client_from_kubeconfig(kubeconfig: &[u8]) -> Result<Client> {
    use kube::config::Kubeconfig;

    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_slice(kubeconfig).map_err(|e| {
        SeedkeeperError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e))
    })?;

    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                SeedkeeperError::KubeconfigError(format!("Failed to create config: {}", e))
            })?;

    Client::try_from(client_config)
        .map_err(|e| SeedkeeperError::KubeconfigError(format!("Failed to create client: {}", e)))
}
