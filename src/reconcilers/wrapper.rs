// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Shared skip rules and success condition handling for controllers acting on a Cluster.

use crate::constants::conditions::REASON_RECONCILING_ERROR;
use crate::error::Result;
use crate::kubernetes::conditions::set_condition;
use crate::kubernetes::patch_status;
use crate::types::cluster::{Cluster, ConditionStatus};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use std::future::Future;
use tracing::{debug, warn};

/// Run `reconcile` if this worker is responsible for `cluster`, then record
/// the outcome as `condition_type` on the cluster.
///
/// Returns `Ok(None)` for skipped clusters. The inner action is passed
/// through untouched, also when an error is returned alongside the
/// condition update.
pub async fn reconcile_wrapper<Fut>(
    api: &Api<Cluster>,
    worker_name: &str,
    cluster: &Cluster,
    condition_type: &str,
    reconcile: Fut,
) -> Result<Option<Action>>
where
    Fut: Future<Output = Result<Option<Action>>>,
{
    let name = cluster.name_any();
    if cluster.is_paused() {
        debug!("Skipping paused cluster {}", name);
        return Ok(None);
    }
    if !cluster.matches_worker(worker_name) {
        debug!("Skipping cluster {}, it belongs to another worker", name);
        return Ok(None);
    }
    if cluster.control_plane_version().is_none() {
        debug!("Skipping cluster {}, no control plane version yet", name);
        return Ok(None);
    }

    let result = reconcile.await;

    let (status, reason, message) = match &result {
        Ok(_) => (ConditionStatus::True, "", String::new()),
        Err(e) => (ConditionStatus::False, REASON_RECONCILING_ERROR, e.to_string()),
    };
    let generation = cluster.metadata.generation;
    let updated = patch_status(api, &name, |c: &mut Cluster| {
        let conditions = &mut c.status.get_or_insert_with(Default::default).conditions;
        set_condition(conditions, condition_type, status, reason, &message, generation);
    })
    .await;

    match updated {
        Ok(_) => result,
        // the last finalizer is gone and so is the cluster
        Err(e) if e.is_not_found() => result,
        Err(e) if result.is_err() => {
            warn!("Failed to set condition {} on cluster {}: {}", condition_type, name, e);
            result
        }
        Err(e) => Err(e),
    }
}
