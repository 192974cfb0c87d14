// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cloud providers that prepare and tear down the infrastructure a cluster runs on.
//!
//! A provider never writes the Cluster itself. Every change it makes to the
//! spec or the finalizers goes through the [`ClusterUpdater`] handed to it, so
//! names of remote resources are persisted as soon as they exist.

pub mod azure;
pub mod bringyourown;
pub mod packet;

use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::{update_cluster_validated, SecretKeyGetter};
use crate::types::cloud::{CloudSpec, GlobalSecretKeySelector, ProviderKind};
use crate::types::cluster::Cluster;
use crate::types::seed::{Datacenter, Seed};
use async_trait::async_trait;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::debug;

pub use azure::arm::{ArmConnector, HttpArmConnector};
pub use azure::AzureProvider;
pub use bringyourown::BringYourOwnProvider;
pub use packet::PacketProvider;

/// Persists spec and finalizer changes of a Cluster
#[async_trait]
pub trait ClusterUpdater: Send + Sync {
    /// Apply `modify` to the latest stored Cluster and return the result
    async fn update(
        &self,
        name: &str,
        modify: &(dyn for<'c> Fn(&'c mut Cluster) + Send + Sync),
    ) -> Result<Cluster>;
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fill in provider defaults. Only touches the given spec.
    fn default_cloud_spec(&self, spec: &mut CloudSpec) -> Result<()>;

    /// Check that the spec is usable, e.g. that referenced resources exist
    async fn validate_cloud_spec(&self, spec: &CloudSpec) -> Result<()>;

    /// Reject changes to fields that are immutable once set
    fn validate_cloud_spec_update(&self, old: &CloudSpec, new: &CloudSpec) -> Result<()>;

    /// Create the infrastructure of a new cluster
    async fn initialize_cloud_provider(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster>;

    /// Converge the infrastructure of an initialized cluster
    async fn reconcile_cluster(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster>;

    /// Delete everything the provider created, one finalizer at a time
    async fn clean_up_cloud_provider(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster>;

    /// Cloud config handed to the controller-manager. Empty when the
    /// provider has no in-tree cloud integration.
    fn cloud_config(&self, _spec: &CloudSpec) -> Result<String> {
        Ok(String::new())
    }
}

/// An inline credential value, or the `key` of the referenced secret when it is empty
pub(crate) async fn credential(
    secrets: &dyn SecretKeyGetter,
    provider: &str,
    inline: &str,
    reference: Option<&GlobalSecretKeySelector>,
    key: &str,
) -> Result<String> {
    if !inline.is_empty() {
        return Ok(inline.to_string());
    }
    match reference {
        Some(selector) => secrets.get(selector, key).await,
        None => Err(SeedkeeperError::Credentials(format!(
            "no {} {} given and no credentials reference set",
            provider, key
        ))),
    }
}

/// Writes Cluster changes to the seed, validating them first
pub struct SeedClusterUpdater {
    api: Api<Cluster>,
    provider: Arc<dyn CloudProvider>,
}

impl SeedClusterUpdater {
    pub fn new(client: Client, provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            api: Api::all(client),
            provider,
        }
    }
}

#[async_trait]
impl ClusterUpdater for SeedClusterUpdater {
    async fn update(
        &self,
        name: &str,
        modify: &(dyn for<'c> Fn(&'c mut Cluster) + Send + Sync),
    ) -> Result<Cluster> {
        update_cluster_validated(&self.api, name, |c| modify(c), |new, old| {
            self.provider
                .validate_cloud_spec_update(&old.spec.cloud, &new.spec.cloud)
        })
        .await
    }
}

/// Looks up the provider responsible for a cluster
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve(&self, cluster: &Cluster) -> Result<Arc<dyn CloudProvider>>;
}

/// Resolves providers from the datacenters of this controller's Seed
pub struct ProviderRegistry {
    seeds: Api<Seed>,
    seed_name: String,
    secrets: Arc<dyn SecretKeyGetter>,
    arm: Arc<dyn ArmConnector>,
}

impl ProviderRegistry {
    pub fn new(
        client: Client,
        namespace: &str,
        seed_name: &str,
        secrets: Arc<dyn SecretKeyGetter>,
        arm: Arc<dyn ArmConnector>,
    ) -> Self {
        Self {
            seeds: Api::namespaced(client, namespace),
            seed_name: seed_name.to_string(),
            secrets,
            arm,
        }
    }

    /// Pick the provider for a cloud spec, checking it matches the datacenter
    pub fn provider_for(
        &self,
        cloud: &CloudSpec,
        datacenter: &Datacenter,
    ) -> Result<Arc<dyn CloudProvider>> {
        let kind = cloud.provider_kind()?;
        let datacenter_kind = datacenter.spec.provider_kind()?;
        if kind != datacenter_kind {
            return Err(SeedkeeperError::InvalidCloudSpec(format!(
                "cluster uses provider {} but datacenter {} is a {} datacenter",
                kind, cloud.datacenter_name, datacenter_kind
            )));
        }

        Ok(match kind {
            ProviderKind::Azure => Arc::new(AzureProvider::new(
                datacenter.spec.azure.clone().unwrap_or_default(),
                self.secrets.clone(),
                self.arm.clone(),
            )),
            ProviderKind::Packet => Arc::new(PacketProvider::new(self.secrets.clone())),
            ProviderKind::BringYourOwn => Arc::new(BringYourOwnProvider),
        })
    }
}

#[async_trait]
impl ProviderResolver for ProviderRegistry {
    async fn resolve(&self, cluster: &Cluster) -> Result<Arc<dyn CloudProvider>> {
        let seed = self.seeds.get(&self.seed_name).await?;
        let datacenter = seed.datacenter(&cluster.spec.cloud.datacenter_name)?;
        debug!(
            "Resolved datacenter {} of seed {} for cluster",
            cluster.spec.cloud.datacenter_name, self.seed_name
        );
        self.provider_for(&cluster.spec.cloud, datacenter)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory updater shared by the provider tests

    use super::*;
    use std::sync::Mutex;

    /// Applies updates to a local copy and records a line per update
    pub struct RecordingUpdater {
        pub cluster: Mutex<Cluster>,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingUpdater {
        pub fn new(cluster: Cluster, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                cluster: Mutex::new(cluster),
                log,
            }
        }

        pub fn current(&self) -> Cluster {
            self.cluster.lock().unwrap().clone()
        }

        pub fn updates(&self) -> usize {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.starts_with("update"))
                .count()
        }
    }

    #[async_trait]
    impl ClusterUpdater for RecordingUpdater {
        async fn update(
            &self,
            _name: &str,
            modify: &(dyn for<'c> Fn(&'c mut Cluster) + Send + Sync),
        ) -> Result<Cluster> {
            let mut cluster = self.cluster.lock().unwrap();
            let mut modified = cluster.clone();
            modify(&mut modified);
            if modified != *cluster {
                let azure = modified.spec.cloud.azure.clone().unwrap_or_default();
                self.log.lock().unwrap().push(format!(
                    "update rg={} vnet={} subnet={} finalizers={}",
                    azure.resource_group,
                    azure.vnet_name,
                    azure.subnet_name,
                    modified.metadata.finalizers.clone().unwrap_or_default().join(",")
                ));
                *cluster = modified;
            }
            Ok(cluster.clone())
        }
    }
}
