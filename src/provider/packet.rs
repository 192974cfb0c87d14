// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Packet (Equinix Metal). Machines are created by the machine controller, so
//! the only infrastructure work here is defaulting the billing cycle.

use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::SecretKeyGetter;
use crate::provider::{credential, CloudProvider, ClusterUpdater};
use crate::types::cloud::{CloudSpec, PacketCloudSpec, ProviderKind};
use crate::types::cluster::Cluster;
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::info;

const DEFAULT_BILLING_CYCLE: &str = "hourly";

const API_KEY_KEY: &str = "apiKey";
const PROJECT_ID_KEY: &str = "projectID";

pub struct PacketProvider {
    secrets: Arc<dyn SecretKeyGetter>,
}

impl PacketProvider {
    pub fn new(secrets: Arc<dyn SecretKeyGetter>) -> Self {
        Self { secrets }
    }

    /// API key and project ID, inline values taking precedence over the secret
    async fn credentials(&self, spec: &PacketCloudSpec) -> Result<(String, String)> {
        let secrets = self.secrets.as_ref();
        let reference = spec.credentials_reference.as_ref();
        Ok((
            credential(secrets, "Packet", &spec.api_key, reference, API_KEY_KEY).await?,
            credential(secrets, "Packet", &spec.project_id, reference, PROJECT_ID_KEY).await?,
        ))
    }
}

fn packet_spec(cloud: &CloudSpec) -> Result<&PacketCloudSpec> {
    cloud
        .packet
        .as_ref()
        .ok_or_else(|| SeedkeeperError::InvalidCloudSpec("cluster has no Packet cloud spec".to_string()))
}

#[async_trait]
impl CloudProvider for PacketProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Packet
    }

    fn default_cloud_spec(&self, _spec: &mut CloudSpec) -> Result<()> {
        Ok(())
    }

    async fn validate_cloud_spec(&self, spec: &CloudSpec) -> Result<()> {
        self.credentials(packet_spec(spec)?).await.map(|_| ())
    }

    fn validate_cloud_spec_update(&self, _old: &CloudSpec, _new: &CloudSpec) -> Result<()> {
        Ok(())
    }

    async fn initialize_cloud_provider(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        if !packet_spec(&cluster.spec.cloud)?.billing_cycle.is_empty() {
            return Ok(cluster);
        }

        info!(
            "Defaulting billing cycle of cluster {} to {}",
            cluster.name_any(),
            DEFAULT_BILLING_CYCLE
        );
        updater
            .update(&cluster.name_any(), &|c: &mut Cluster| {
                if let Some(packet) = c.spec.cloud.packet.as_mut() {
                    packet.billing_cycle = DEFAULT_BILLING_CYCLE.to_string();
                }
            })
            .await
    }

    async fn reconcile_cluster(&self, cluster: Cluster, _updater: &dyn ClusterUpdater) -> Result<Cluster> {
        Ok(cluster)
    }

    async fn clean_up_cloud_provider(
        &self,
        cluster: Cluster,
        _updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        Ok(cluster)
    }
}
