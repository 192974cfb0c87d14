// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster reconciler - converges cloud infrastructure and the control plane
//! objects of every Cluster, and runs the deletion pipeline once it is deleted.

use crate::config::Config;
use crate::constants::conditions::{
    CLUSTER_CONTROLLER_SUCCESS, CLUSTER_INITIALIZED, REASON_RECONCILE_CLUSTER_ERROR,
};
use crate::constants::finalizers::{
    CREDENTIALS_SECRETS_CLEANUP, IN_CLUSTER_LB_CLEANUP, IN_CLUSTER_PV_CLEANUP, NODE_DELETION,
};
use crate::constants::requeue::{ERROR_SECS, RESYNC_SECS, SHORT_SECS};
use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::conditions::set_condition;
use crate::kubernetes::events::{publish_event, TYPE_NORMAL, TYPE_WARNING};
use crate::kubernetes::{add_finalizers, patch_status, KubeconfigProvider};
use crate::provider::{CloudProvider, ClusterUpdater, ProviderResolver, SeedClusterUpdater};
use crate::reconcilers::deletion::Deletion;
use crate::reconcilers::health::sync_health;
use crate::reconcilers::resources::{ensure_resources, TemplateData};
use crate::reconcilers::wrapper::reconcile_wrapper;
use crate::types::cluster::{default_namespace_name, Cluster, ConditionStatus, HealthStatus};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::ListParams;
use kube::{
    runtime::{controller, controller::Action, watcher, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct ClusterReconciler {
    client: Client,
    config: Config,
    providers: Arc<dyn ProviderResolver>,
    kubeconfigs: Arc<dyn KubeconfigProvider>,
}

impl ClusterReconciler {
    pub fn new(
        client: Client,
        config: Config,
        providers: Arc<dyn ProviderResolver>,
        kubeconfigs: Arc<dyn KubeconfigProvider>,
    ) -> Self {
        Self {
            client,
            config,
            providers,
            kubeconfigs,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let statefulsets: Api<StatefulSet> = Api::all(self.client.clone());
        let services: Api<Service> = Api::all(self.client.clone());
        let config_maps: Api<ConfigMap> = Api::all(self.client.clone());
        let workers = self.config.workers;
        let context = Arc::new(self);

        Controller::new(clusters, watcher::Config::default())
            .owns(deployments, watcher::Config::default())
            .owns(statefulsets, watcher::Config::default())
            .owns(services, watcher::Config::default())
            .owns(config_maps, watcher::Config::default())
            .with_config(controller::Config::default().concurrency(workers))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled cluster: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn clusters(&self) -> Api<Cluster> {
        Api::all(self.client.clone())
    }

    async fn reconcile(&self, cluster: &Cluster) -> Result<Option<Action>> {
        let name = cluster.name_any();

        if cluster.is_deleting() {
            Deletion::new(self.client.clone(), self.kubeconfigs.as_ref(), self.providers.as_ref())
                .cleanup_cluster(cluster.clone())
                .await?;
            return Ok(Some(Action::requeue(Duration::from_secs(SHORT_SECS))));
        }

        let admitted = !cluster.is_update_in_progress() || {
            let all = self.clusters().list(&ListParams::default()).await?.items;
            has_update_slot(
                cluster,
                &all,
                &self.config.worker_name,
                self.config.concurrent_cluster_updates,
            )
        };
        if !admitted {
            info!(
                "Concurrency limit reached, checking again in {} seconds",
                SHORT_SECS
            );
            return Ok(Some(Action::requeue(Duration::from_secs(SHORT_SECS))));
        }

        let cluster = sync_health(&self.client, cluster).await?;

        let result = self.reconcile_cluster(cluster).await;
        let (reason, message) = match &result {
            Ok(_) => (None, None),
            Err(e) => (Some(REASON_RECONCILE_CLUSTER_ERROR.to_string()), Some(e.to_string())),
        };
        let recorded = patch_status(&self.clusters(), &name, |c: &mut Cluster| {
            let status = c.status.get_or_insert_with(Default::default);
            status.error_reason = reason;
            status.error_message = message;
        })
        .await;

        match recorded {
            Ok(_) => result,
            Err(e) if result.is_err() => {
                warn!("Failed to record error on cluster {}: {}", name, e);
                result
            }
            Err(e) => Err(e),
        }
    }

    async fn reconcile_cluster(&self, cluster: Cluster) -> Result<Option<Action>> {
        let name = cluster.name_any();
        let api = self.clusters();
        let provider = self.providers.resolve(&cluster).await?;
        let updater = SeedClusterUpdater::new(self.client.clone(), provider.clone());

        let mut cluster = cluster;
        if cluster.spec.cloud.credentials_reference().is_some() {
            cluster = add_finalizers(&api, &cluster, &[CREDENTIALS_SECRETS_CLEANUP]).await?;
        }

        let infrastructure = self
            .reconcile_cloud_provider(cluster, provider.as_ref(), &updater)
            .await;
        let health = if infrastructure.is_ok() {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        let latest = patch_status(&api, &name, |c: &mut Cluster| {
            c.status
                .get_or_insert_with(Default::default)
                .extended_health
                .cloud_provider_infrastructure = health;
        })
        .await?;
        infrastructure?;
        let cluster = latest;

        let cloud_config = provider.cloud_config(&cluster.spec.cloud)?;
        let data = TemplateData::new(&cluster, provider.kind().as_str(), cloud_config);
        ensure_resources(&self.client, &cluster, &data).await?;

        // in-cluster cleanup needs a reachable apiserver
        if cluster.health().apiserver == HealthStatus::Up {
            add_finalizers(
                &api,
                &cluster,
                &[IN_CLUSTER_LB_CLEANUP, IN_CLUSTER_PV_CLEANUP, NODE_DELETION],
            )
            .await?;
        }

        Ok(None)
    }

    /// Initialize the provider until the cluster is marked initialized,
    /// reconcile it afterwards
    async fn reconcile_cloud_provider(
        &self,
        cluster: Cluster,
        provider: &dyn CloudProvider,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        if cluster.condition_is_true(CLUSTER_INITIALIZED) {
            return provider.reconcile_cluster(cluster, updater).await;
        }

        let name = cluster.name_any();
        let mut cloud = cluster.spec.cloud.clone();
        provider.default_cloud_spec(&mut cloud)?;
        let cluster = if cloud != cluster.spec.cloud {
            debug!("Defaulting cloud spec of cluster {}", name);
            updater
                .update(&name, &|c: &mut Cluster| c.spec.cloud = cloud.clone())
                .await?
        } else {
            cluster
        };

        provider.validate_cloud_spec(&cluster.spec.cloud).await?;
        let cluster = provider.initialize_cloud_provider(cluster, updater).await?;

        let generation = cluster.metadata.generation;
        let cluster = patch_status(&self.clusters(), &name, |c: &mut Cluster| {
            let conditions = &mut c.status.get_or_insert_with(Default::default).conditions;
            set_condition(
                conditions,
                CLUSTER_INITIALIZED,
                ConditionStatus::True,
                "",
                "",
                generation,
            );
        })
        .await?;
        info!("Initialized {} cloud provider of cluster {}", provider.kind(), name);
        publish_event(
            &self.client,
            &cluster,
            TYPE_NORMAL,
            "ClusterInitialized",
            "Cloud provider infrastructure initialized",
        )
        .await;
        Ok(cluster)
    }
}

/// Default the status namespace and stamp the initial control plane version
async fn reconcile_cluster_status(api: &Api<Cluster>, cluster: &Cluster) -> Result<Cluster> {
    let name = cluster.name_any();
    let version = cluster.spec.version.clone();
    patch_status(api, &name, |c: &mut Cluster| {
        let status = c.status.get_or_insert_with(Default::default);
        if status.namespace_name.is_empty() {
            status.namespace_name = default_namespace_name(&name);
        }
        if status.versions.control_plane.is_empty() && !version.is_empty() {
            status.versions.control_plane = version;
        }
    })
    .await
}

/// Clusters that are not mid-update always get a slot. Updating clusters this
/// worker reconciles are ranked by age and only the oldest `limit` may proceed.
pub(crate) fn has_update_slot(cluster: &Cluster, all: &[Cluster], worker_name: &str, limit: usize) -> bool {
    if !cluster.is_update_in_progress() {
        return true;
    }

    let key = |c: &Cluster| (c.creation_timestamp().map(|t| t.0), c.name_any());
    let mut updating: Vec<_> = all
        .iter()
        .filter(|c| {
            !c.is_deleting() && !c.is_paused() && c.matches_worker(worker_name) && c.is_update_in_progress()
        })
        .map(key)
        .collect();
    updating.sort();

    let own = key(cluster);
    updating.iter().take(limit).any(|k| *k == own)
}

#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<ClusterReconciler>) -> Result<Action> {
    let api = ctx.clusters();
    let cluster = match reconcile_cluster_status(&api, &cluster).await {
        Ok(cluster) => cluster,
        Err(e) if e.is_not_found() => return Ok(Action::await_change()),
        Err(e) => return Err(e),
    };
    if cluster.control_plane_version().is_none() {
        debug!("Cluster has no version yet");
        return Ok(Action::await_change());
    }

    let result = reconcile_wrapper(
        &api,
        &ctx.config.worker_name,
        &cluster,
        CLUSTER_CONTROLLER_SUCCESS,
        ctx.reconcile(&cluster),
    )
    .await;

    match result {
        Ok(Some(action)) => Ok(action),
        Ok(None) => Ok(Action::requeue(Duration::from_secs(RESYNC_SECS))),
        Err(e) => {
            publish_event(&ctx.client, &cluster, TYPE_WARNING, "ReconcilingError", &e.to_string()).await;
            Err(e)
        }
    }
}

fn error_policy(cluster: Arc<Cluster>, error: &SeedkeeperError, _ctx: Arc<ClusterReconciler>) -> Action {
    error!("Reconciling cluster {} failed: {}", cluster.name_any(), error);
    if cluster.is_deleting() {
        Action::requeue(Duration::from_secs(SHORT_SECS))
    } else if error.is_permanent() {
        Action::await_change()
    } else {
        Action::requeue(Duration::from_secs(ERROR_SECS))
    }
}
