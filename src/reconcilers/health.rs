// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane health derived from the workloads in the cluster namespace.

use crate::constants::components::{APISERVER, CONTROLLER_MANAGER, ETCD, SCHEDULER};
use crate::error::Result;
use crate::kubernetes::patch_status;
use crate::types::cluster::{Cluster, HealthStatus};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

/// Up once every desired replica is ready and updated, Down without any ready replica
fn replica_health(desired: i32, ready: i32, updated: i32) -> HealthStatus {
    if ready >= desired && updated >= desired {
        HealthStatus::Up
    } else if ready > 0 {
        HealthStatus::Provisioning
    } else {
        HealthStatus::Down
    }
}

pub fn deployment_health(deployment: Option<&Deployment>) -> HealthStatus {
    let Some(deployment) = deployment else {
        return HealthStatus::Down;
    };
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = deployment.status.clone().unwrap_or_default();
    replica_health(
        desired,
        status.ready_replicas.unwrap_or(0),
        status.updated_replicas.unwrap_or(0),
    )
}

pub fn statefulset_health(statefulset: Option<&StatefulSet>) -> HealthStatus {
    let Some(statefulset) = statefulset else {
        return HealthStatus::Down;
    };
    let desired = statefulset.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = statefulset.status.clone().unwrap_or_default();
    replica_health(
        desired,
        status.ready_replicas.unwrap_or(0),
        status.updated_replicas.unwrap_or(0),
    )
}

/// Kubernetes version of the apiserver Deployment, taken from its image tag
pub fn apiserver_version(deployment: &Deployment) -> Option<String> {
    let containers = &deployment.spec.as_ref()?.template.spec.as_ref()?.containers;
    let image = containers
        .iter()
        .find(|c| c.name == APISERVER)
        .or_else(|| containers.first())?
        .image
        .as_deref()?;
    let (_, tag) = image.rsplit_once(':')?;
    Some(tag.trim_start_matches('v').to_string())
}

/// Write the current component health to the cluster status.
///
/// The observed apiserver version only moves once the apiserver is fully up.
pub async fn sync_health(client: &Client, cluster: &Cluster) -> Result<Cluster> {
    let namespace = cluster.namespace_name();
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);

    let apiserver = deployments.get_opt(APISERVER).await?;
    let controller = deployments.get_opt(CONTROLLER_MANAGER).await?;
    let scheduler = deployments.get_opt(SCHEDULER).await?;
    let etcd = statefulsets.get_opt(ETCD).await?;

    let apiserver_health = deployment_health(apiserver.as_ref());
    let controller_health = deployment_health(controller.as_ref());
    let scheduler_health = deployment_health(scheduler.as_ref());
    let etcd_health = statefulset_health(etcd.as_ref());
    let version = apiserver
        .as_ref()
        .filter(|_| apiserver_health == HealthStatus::Up)
        .and_then(apiserver_version);

    let current = cluster.health();
    if current.apiserver != apiserver_health
        || current.controller != controller_health
        || current.scheduler != scheduler_health
        || current.etcd != etcd_health
    {
        info!(
            "Health of cluster {} changed: apiserver={:?} controller={:?} scheduler={:?} etcd={:?}",
            cluster.name_any(),
            apiserver_health,
            controller_health,
            scheduler_health,
            etcd_health
        );
    } else {
        debug!("Health of cluster {} unchanged", cluster.name_any());
    }

    let api: Api<Cluster> = Api::all(client.clone());
    patch_status(&api, &cluster.name_any(), |c: &mut Cluster| {
        let status = c.status.get_or_insert_with(Default::default);
        status.extended_health.apiserver = apiserver_health;
        status.extended_health.controller = controller_health;
        status.extended_health.scheduler = scheduler_health;
        status.extended_health.etcd = etcd_health;
        if let Some(version) = &version {
            status.versions.apiserver = version.clone();
        }
    })
    .await
}
