// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Addon reconciler - keeps the rendered manifests of every Addon applied
//! inside its tenant cluster, and removes them again once the Addon is deleted.

use crate::addon::{combine_manifests, credentials, render_addon, ManifestApplier, TemplateData};
use crate::config::Config;
use crate::constants::addon::CLEANUP_FINALIZER;
use crate::constants::conditions::{ADDON_CONTROLLER_SUCCESS, ADDON_RESOURCES_CREATED};
use crate::constants::labels;
use crate::constants::requeue::{ERROR_SECS, SHORT_SECS};
use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::conditions::set_condition;
use crate::kubernetes::events::{publish_event, TYPE_WARNING};
use crate::kubernetes::{add_finalizers, patch_status, remove_finalizers, KubeconfigProvider, SecretKeyGetter};
use crate::reconcilers::wrapper::reconcile_wrapper;
use crate::types::addon::Addon;
use crate::types::cluster::{Cluster, ConditionStatus, HealthStatus};
use futures::StreamExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube_runtime::reflector::ObjectRef;
use kube::{
    runtime::{controller, controller::Action, watcher, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct AddonReconciler {
    client: Client,
    config: Config,
    kubeconfigs: Arc<dyn KubeconfigProvider>,
    secrets: Arc<dyn SecretKeyGetter>,
    applier: Arc<dyn ManifestApplier>,
}

impl AddonReconciler {
    pub fn new(
        client: Client,
        config: Config,
        kubeconfigs: Arc<dyn KubeconfigProvider>,
        secrets: Arc<dyn SecretKeyGetter>,
        applier: Arc<dyn ManifestApplier>,
    ) -> Self {
        Self {
            client,
            config,
            kubeconfigs,
            secrets,
            applier,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addons: Api<Addon> = Api::all(self.client.clone());
        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let workers = self.config.workers;
        let context = Arc::new(self);

        let controller = Controller::new(addons, watcher::Config::default());
        let store = controller.store();
        controller
            .watches(clusters, watcher::Config::default(), move |cluster: Cluster| {
                addons_of(&store.state(), &cluster.name_any())
            })
            .with_config(controller::Config::default().concurrency(workers))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled addon: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn clusters(&self) -> Api<Cluster> {
        Api::all(self.client.clone())
    }

    fn addons(&self, addon: &Addon) -> Api<Addon> {
        Api::namespaced(self.client.clone(), &addon.namespace().unwrap_or_default())
    }

    /// Requeue for periodic enforcement, or wait for changes when disabled
    fn enforce_action(&self) -> Action {
        if self.config.addon_enforce_interval.is_zero() {
            Action::await_change()
        } else {
            Action::requeue(self.config.addon_enforce_interval)
        }
    }

    async fn reconcile(&self, addon: &Addon, cluster: &Cluster) -> Result<Option<Action>> {
        let name = addon.name_any();
        if cluster.health().apiserver != HealthStatus::Up {
            debug!("API server is not running, trying again in {} seconds", SHORT_SECS);
            return Ok(Some(Action::requeue(Duration::from_secs(SHORT_SECS))));
        }

        if !self.required_types_served(addon, cluster).await? {
            return Ok(Some(Action::requeue(Duration::from_secs(SHORT_SECS))));
        }

        if addon.is_deleting() {
            self.cleanup_manifests(addon, cluster).await?;
            remove_finalizers(&self.addons(addon), addon, &[CLEANUP_FINALIZER]).await?;
            return Ok(Some(Action::await_change()));
        }

        // operators may edit or delete resources of addons that are not enforced
        if addon.condition_is_true(ADDON_RESOURCES_CREATED) && !addon.ensure_resources() {
            debug!("Resources of addon {} are created and not enforced", name);
            return Ok(None);
        }

        self.ensure_installed(addon, cluster).await?;
        let addon = add_finalizers(&self.addons(addon), addon, &[CLEANUP_FINALIZER]).await?;
        if !addon.condition_is_true(ADDON_RESOURCES_CREATED) {
            let generation = addon.metadata.generation;
            patch_status(&self.addons(&addon), &name, |a: &mut Addon| {
                let conditions = &mut a.status.get_or_insert_with(Default::default).conditions;
                set_condition(
                    conditions,
                    ADDON_RESOURCES_CREATED,
                    ConditionStatus::True,
                    "",
                    "",
                    generation,
                );
            })
            .await?;
        }

        Ok(None)
    }

    /// Every required kind must be listable in the tenant cluster
    async fn required_types_served(&self, addon: &Addon, cluster: &Cluster) -> Result<bool> {
        if addon.spec.required_resource_types.is_empty() {
            return Ok(true);
        }

        let client = self.kubeconfigs.client(cluster).await?;
        for required in &addon.spec.required_resource_types {
            let gvk = GroupVersionKind::gvk(&required.group, &required.version, &required.kind);
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &ApiResource::from_gvk(&gvk));
            match api.list(&ListParams::default().limit(1)).await {
                Ok(_) => {}
                Err(kube::Error::Api(err)) if err.code == 404 => {
                    info!(
                        "Required resource {}/{} {} isn't served, trying again in {} seconds",
                        required.group, required.version, required.kind, SHORT_SECS
                    );
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Admin kubeconfig and the combined, labeled manifest of the addon
    async fn render(&self, addon: &Addon, cluster: &Cluster) -> Result<(Vec<u8>, String)> {
        let kubeconfig = self.kubeconfigs.admin_kubeconfig(cluster).await?;
        let credentials = credentials(self.secrets.as_ref(), &cluster.spec.cloud).await?;
        let data = TemplateData::new(
            cluster,
            credentials,
            String::from_utf8_lossy(&kubeconfig).into_owned(),
            addon.spec.variables.clone(),
        )?;
        let objects = render_addon(&self.config.addon_dir, &addon.spec.name, &data)?;
        Ok((kubeconfig, combine_manifests(&objects)?))
    }

    #[instrument(skip_all, fields(addon = %addon.name_any()))]
    async fn ensure_installed(&self, addon: &Addon, cluster: &Cluster) -> Result<()> {
        let (kubeconfig, manifest) = self.render(addon, cluster).await?;
        if manifest.trim().is_empty() {
            debug!("Skipping addon installation as the manifest is empty");
            return Ok(());
        }

        let selector = format!("{}={}", labels::ADDON, addon.spec.name);
        self.applier.apply(&kubeconfig, &manifest, &selector).await
    }

    #[instrument(skip_all, fields(addon = %addon.name_any()))]
    async fn cleanup_manifests(&self, addon: &Addon, cluster: &Cluster) -> Result<()> {
        let (kubeconfig, manifest) = match self.render(addon, cluster).await {
            Ok(rendered) => rendered,
            Err(SeedkeeperError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Templates of addon {} are gone, nothing to delete", addon.spec.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if manifest.trim().is_empty() {
            return Ok(());
        }
        self.applier.delete(&kubeconfig, &manifest).await
    }
}

/// Addons targeting the cluster `cluster`
fn addons_of(addons: &[Arc<Addon>], cluster: &str) -> Vec<ObjectRef<Addon>> {
    addons
        .iter()
        .filter(|a| a.spec.cluster.name == cluster)
        .map(|a| ObjectRef::from_obj(a.as_ref()))
        .collect()
}

#[instrument(skip(addon, ctx), fields(addon = %addon.name_any(), cluster = %addon.spec.cluster.name))]
async fn reconcile(addon: Arc<Addon>, ctx: Arc<AddonReconciler>) -> Result<Action> {
    let clusters = ctx.clusters();
    let Some(cluster) = clusters.get_opt(&addon.spec.cluster.name).await? else {
        // manifests can not be removed from a cluster that is gone
        debug!("Cluster {} is gone, releasing addon", addon.spec.cluster.name);
        remove_finalizers(&ctx.addons(&addon), &addon, &[CLEANUP_FINALIZER]).await?;
        return Ok(Action::await_change());
    };
    if cluster.control_plane_version().is_none() {
        debug!("Cluster has no version status yet");
        return Ok(Action::await_change());
    }

    let result = reconcile_wrapper(
        &clusters,
        &ctx.config.worker_name,
        &cluster,
        ADDON_CONTROLLER_SUCCESS,
        ctx.reconcile(&addon, &cluster),
    )
    .await;

    match result {
        Ok(Some(action)) => Ok(action),
        Ok(None) => Ok(ctx.enforce_action()),
        Err(e) => {
            publish_event(&ctx.client, addon.as_ref(), TYPE_WARNING, "ReconcilingError", &e.to_string()).await;
            let message = format!("failed to reconcile Addon {}: {}", addon.name_any(), e);
            publish_event(&ctx.client, &cluster, TYPE_WARNING, "ReconcilingError", &message).await;
            Err(e)
        }
    }
}

fn error_policy(addon: Arc<Addon>, error: &SeedkeeperError, _ctx: Arc<AddonReconciler>) -> Action {
    error!("Reconciling addon {} failed: {}", addon.name_any(), error);
    if error.is_permanent() {
        Action::await_change()
    } else {
        Action::requeue(Duration::from_secs(ERROR_SECS))
    }
}
