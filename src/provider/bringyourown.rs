// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Clusters whose nodes are provisioned by the user. There is no infrastructure to manage.

use crate::error::Result;
use crate::provider::{CloudProvider, ClusterUpdater};
use crate::types::cloud::{CloudSpec, ProviderKind};
use crate::types::cluster::Cluster;
use async_trait::async_trait;

pub struct BringYourOwnProvider;

#[async_trait]
impl CloudProvider for BringYourOwnProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BringYourOwn
    }

    fn default_cloud_spec(&self, _spec: &mut CloudSpec) -> Result<()> {
        Ok(())
    }

    async fn validate_cloud_spec(&self, _spec: &CloudSpec) -> Result<()> {
        Ok(())
    }

    fn validate_cloud_spec_update(&self, _old: &CloudSpec, _new: &CloudSpec) -> Result<()> {
        Ok(())
    }

    async fn initialize_cloud_provider(&self, cluster: Cluster, _updater: &dyn ClusterUpdater) -> Result<Cluster> {
        Ok(cluster)
    }

    async fn reconcile_cluster(&self, cluster: Cluster, _updater: &dyn ClusterUpdater) -> Result<Cluster> {
        Ok(cluster)
    }

    async fn clean_up_cloud_provider(&self, cluster: Cluster, _updater: &dyn ClusterUpdater) -> Result<Cluster> {
        Ok(cluster)
    }
}
