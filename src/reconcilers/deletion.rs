// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ordered, finalizer gated cleanup of a deleting Cluster.
//!
//! Every stage removes its finalizer only once its cleanup is confirmed. A
//! pass stops early whenever a stage is still waiting on something, the next
//! pass picks up where it left off.

use crate::constants::finalizers::{
    CLUSTER_ROLE_BINDINGS_CLEANUP, CONSTRAINTS_CLEANUP, CREDENTIALS_SECRETS_CLEANUP,
    ETCD_BACKUP_CONFIG_CLEANUP, IN_CLUSTER_LB_CLEANUP, IN_CLUSTER_PV_CLEANUP, NODE_DELETION,
};
use crate::error::Result;
use crate::kubernetes::{remove_finalizers, FinalizerSet, KubeconfigProvider};
use crate::provider::{ProviderResolver, SeedClusterUpdater};
use crate::types::cluster::Cluster;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service};
use kube::api::{ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams};
use kube::{Api, Client, ResourceExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

fn constraint_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("kubermatic.k8c.io", "v1", "Constraint"),
        "constraints",
    )
}

fn etcd_backup_config_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("kubermatic.k8c.io", "v1", "EtcdBackupConfig"),
        "etcdbackupconfigs",
    )
}

fn machine_deployment_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cluster.k8s.io", "v1alpha1", "MachineDeployment"),
        "machinedeployments",
    )
}

fn machine_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cluster.k8s.io", "v1alpha1", "Machine"),
        "machines",
    )
}

/// Names of all objects in `api`; a kind that is not served has none
async fn list_names(api: &Api<DynamicObject>) -> Result<Vec<String>> {
    match api.list(&ListParams::default()).await {
        Ok(list) => Ok(list.items.iter().map(|o| o.name_any()).collect()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn delete_ignoring_not_found<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether `pod` mounts one of the `(namespace, name)` claims
fn mounts_any(pod: &Pod, claims: &[(String, String)]) -> bool {
    let namespace = pod.namespace().unwrap_or_default();
    pod.spec
        .iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
        .filter_map(|v| v.persistent_volume_claim.as_ref())
        .any(|c| claims.iter().any(|(ns, name)| *ns == namespace && *name == c.claim_name))
}

pub struct Deletion<'a> {
    seed: Client,
    kubeconfigs: &'a dyn KubeconfigProvider,
    providers: &'a dyn ProviderResolver,
    tenant: OnceCell<Client>,
}

impl<'a> Deletion<'a> {
    pub fn new(
        seed: Client,
        kubeconfigs: &'a dyn KubeconfigProvider,
        providers: &'a dyn ProviderResolver,
    ) -> Self {
        Self {
            seed,
            kubeconfigs,
            providers,
            tenant: OnceCell::new(),
        }
    }

    fn clusters(&self) -> Api<Cluster> {
        Api::all(self.seed.clone())
    }

    async fn tenant_client(&self, cluster: &Cluster) -> Result<Client> {
        self.tenant
            .get_or_try_init(|| self.kubeconfigs.client(cluster))
            .await
            .cloned()
    }

    async fn remove(&self, cluster: Cluster, finalizer: &str) -> Result<Cluster> {
        remove_finalizers(&self.clusters(), &cluster, &[finalizer]).await
    }

    /// Run one pass over the cleanup stages
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    pub async fn cleanup_cluster(&self, cluster: Cluster) -> Result<()> {
        let Some(cluster) = self.cleanup_namespaced(cluster, &constraint_resource(), CONSTRAINTS_CLEANUP).await? else {
            return Ok(());
        };

        let Some(cluster) = self.cleanup_in_cluster_resources(cluster).await? else {
            return Ok(());
        };
        if FinalizerSet::of(&cluster).has_any(&[IN_CLUSTER_LB_CLEANUP, IN_CLUSTER_PV_CLEANUP]) {
            debug!("Waiting for in-cluster resources to be gone");
            return Ok(());
        }

        let Some(cluster) = self
            .cleanup_namespaced(cluster, &etcd_backup_config_resource(), ETCD_BACKUP_CONFIG_CLEANUP)
            .await?
        else {
            return Ok(());
        };

        let Some(cluster) = self.cleanup_nodes(cluster).await? else {
            return Ok(());
        };

        // bindings are owned by the cluster and garbage collected with it
        let cluster = self.remove(cluster, CLUSTER_ROLE_BINDINGS_CLEANUP).await?;

        let finalizers = FinalizerSet::of(&cluster);
        if finalizers.has(NODE_DELETION) {
            debug!("Waiting for nodes to be gone");
            return Ok(());
        }
        if finalizers.is_empty() {
            return Ok(());
        }

        // only provider finalizers can be left next to the credentials one
        let cluster = if finalizers.iter().any(|f| f != CREDENTIALS_SECRETS_CLEANUP) {
            let provider = self.providers.resolve(&cluster).await?;
            let updater = SeedClusterUpdater::new(self.seed.clone(), provider.clone());
            provider.clean_up_cloud_provider(cluster, &updater).await?
        } else {
            cluster
        };

        self.cleanup_credentials(cluster).await
    }

    /// Delete every object of `resource` in the cluster namespace. Returns
    /// `None` while objects were still found in this pass.
    async fn cleanup_namespaced(
        &self,
        cluster: Cluster,
        resource: &ApiResource,
        finalizer: &str,
    ) -> Result<Option<Cluster>> {
        if !FinalizerSet::of(&cluster).has(finalizer) {
            return Ok(Some(cluster));
        }

        let api: Api<DynamicObject> =
            Api::namespaced_with(self.seed.clone(), &cluster.namespace_name(), resource);
        let names = list_names(&api).await?;
        if !names.is_empty() {
            for name in &names {
                info!("Deleting {} {}", resource.kind, name);
                delete_ignoring_not_found(&api, name).await?;
            }
            return Ok(None);
        }

        Ok(Some(self.remove(cluster, finalizer).await?))
    }

    /// Delete LoadBalancer services and volumes in the tenant cluster.
    /// Returns `None` if anything was deleted in this pass.
    async fn cleanup_in_cluster_resources(&self, cluster: Cluster) -> Result<Option<Cluster>> {
        let finalizers = FinalizerSet::of(&cluster);
        let lb = finalizers.has(IN_CLUSTER_LB_CLEANUP);
        let pv = finalizers.has(IN_CLUSTER_PV_CLEANUP);
        if !lb && !pv {
            return Ok(Some(cluster));
        }

        let tenant = self.tenant_client(&cluster).await?;
        let mut deleted = false;
        let mut load_balancers_gone = false;
        let mut volumes_gone = false;

        if lb {
            let services: Api<Service> = Api::all(tenant.clone());
            let load_balancers: Vec<Service> = services
                .list(&ListParams::default())
                .await?
                .items
                .into_iter()
                .filter(|s| s.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some("LoadBalancer"))
                .collect();
            for svc in load_balancers.iter().filter(|s| s.metadata.deletion_timestamp.is_none()) {
                let api: Api<Service> = Api::namespaced(tenant.clone(), &svc.namespace().unwrap_or_default());
                info!("Deleting LoadBalancer service {}", svc.name_any());
                delete_ignoring_not_found(&api, &svc.name_any()).await?;
                deleted = true;
            }
            load_balancers_gone = load_balancers.is_empty();
        }

        if pv {
            let (deleted_volumes, remaining) = self.cleanup_volumes(&tenant).await?;
            deleted |= deleted_volumes;
            volumes_gone = remaining == 0;
        }

        if deleted {
            return Ok(None);
        }

        let mut cluster = cluster;
        if load_balancers_gone {
            cluster = self.remove(cluster, IN_CLUSTER_LB_CLEANUP).await?;
        }
        if volumes_gone {
            cluster = self.remove(cluster, IN_CLUSTER_PV_CLEANUP).await?;
        }
        Ok(Some(cluster))
    }

    /// Delete volume claims, the pods mounting them and all volumes. Returns
    /// whether anything was deleted and how many claims and volumes were found.
    async fn cleanup_volumes(&self, tenant: &Client) -> Result<(bool, usize)> {
        let claims: Vec<PersistentVolumeClaim> = Api::all(tenant.clone())
            .list(&ListParams::default())
            .await?
            .items;
        let volumes: Vec<PersistentVolume> = Api::all(tenant.clone())
            .list(&ListParams::default())
            .await?
            .items;

        let pending: Vec<(String, String)> = claims
            .iter()
            .filter(|c| c.metadata.deletion_timestamp.is_none())
            .map(|c| (c.namespace().unwrap_or_default(), c.name_any()))
            .collect();

        let mut deleted = false;
        if !pending.is_empty() {
            // claims stay protected while a pod mounts them
            let pods: Vec<Pod> = Api::all(tenant.clone()).list(&ListParams::default()).await?.items;
            for pod in pods
                .iter()
                .filter(|p| p.metadata.deletion_timestamp.is_none() && mounts_any(p, &pending))
            {
                let api: Api<Pod> = Api::namespaced(tenant.clone(), &pod.namespace().unwrap_or_default());
                info!("Deleting pod {} to release its volumes", pod.name_any());
                delete_ignoring_not_found(&api, &pod.name_any()).await?;
                deleted = true;
            }
        }
        for (namespace, name) in &pending {
            let api: Api<PersistentVolumeClaim> = Api::namespaced(tenant.clone(), namespace);
            info!("Deleting PersistentVolumeClaim {}/{}", namespace, name);
            delete_ignoring_not_found(&api, name).await?;
            deleted = true;
        }

        let api: Api<PersistentVolume> = Api::all(tenant.clone());
        for volume in volumes.iter().filter(|v| v.metadata.deletion_timestamp.is_none()) {
            info!("Deleting PersistentVolume {}", volume.name_any());
            delete_ignoring_not_found(&api, &volume.name_any()).await?;
            deleted = true;
        }

        Ok((deleted, claims.len() + volumes.len()))
    }

    /// Delete MachineDeployments, then wait for their Machines to disappear
    async fn cleanup_nodes(&self, cluster: Cluster) -> Result<Option<Cluster>> {
        if !FinalizerSet::of(&cluster).has(NODE_DELETION) {
            return Ok(Some(cluster));
        }

        let tenant = self.tenant_client(&cluster).await?;
        let deployments: Api<DynamicObject> =
            Api::namespaced_with(tenant.clone(), "kube-system", &machine_deployment_resource());
        let names = list_names(&deployments).await?;
        if !names.is_empty() {
            for name in &names {
                info!("Deleting MachineDeployment {}", name);
                delete_ignoring_not_found(&deployments, name).await?;
            }
            return Ok(None);
        }

        let machines: Api<DynamicObject> = Api::namespaced_with(tenant, "kube-system", &machine_resource());
        let remaining = list_names(&machines).await?;
        if !remaining.is_empty() {
            debug!("Waiting for {} machines to be deleted", remaining.len());
            return Ok(None);
        }

        Ok(Some(self.remove(cluster, NODE_DELETION).await?))
    }

    /// Credentials are needed by every earlier stage, so they go last
    async fn cleanup_credentials(&self, cluster: Cluster) -> Result<()> {
        if !FinalizerSet::of(&cluster).has_only(CREDENTIALS_SECRETS_CLEANUP) {
            return Ok(());
        }

        if let Some(reference) = cluster.spec.cloud.credentials_reference() {
            let secrets: Api<Secret> = Api::namespaced(self.seed.clone(), &reference.namespace);
            info!("Deleting credentials secret {}/{}", reference.namespace, reference.name);
            delete_ignoring_not_found(&secrets, &reference.name).await?;
        }
        self.remove(cluster, CREDENTIALS_SECRETS_CLEANUP).await?;
        Ok(())
    }
}
