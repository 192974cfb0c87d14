// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Optimistic-concurrency patches.
//!
//! Every write is computed as a JSON patch between the object as read and a
//! modified copy. Spec and metadata patches carry a `test` operation on the
//! resourceVersion so a concurrent writer makes the patch fail instead of
//! being overwritten. Status goes through the status subresource only.

use crate::error::{Result, SeedkeeperError};
use crate::types::cluster::Cluster;
use crate::validation::validate_cluster_update;
use json_patch::PatchOperation;
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use tracing::debug;

/// Patch `original` into `modified`, failing if the stored object changed meanwhile
pub async fn patch_guarded<K>(api: &Api<K>, original: &K, modified: &K) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let diff = json_patch::diff(&serde_json::to_value(original)?, &serde_json::to_value(modified)?);
    if diff.0.is_empty() {
        debug!("No changes for {}, skipping patch", original.name_any());
        return Ok(original.clone());
    }

    let mut ops = Vec::with_capacity(diff.0.len() + 1);
    if let Some(rv) = original.meta().resource_version.as_deref() {
        ops.push(resource_version_test(rv)?);
    }
    ops.extend(diff.0);

    Ok(api
        .patch(
            &original.name_any(),
            &PatchParams::default(),
            &Patch::Json::<()>(json_patch::Patch(ops)),
        )
        .await?)
}

fn resource_version_test(rv: &str) -> Result<PatchOperation> {
    Ok(serde_json::from_value(json!({
        "op": "test",
        "path": "/metadata/resourceVersion",
        "value": rv,
    }))?)
}

/// Read the latest object, let `modify` change it and write back only its status
pub async fn patch_status<K, F>(api: &Api<K>, name: &str, modify: F) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
    F: FnOnce(&mut K),
{
    let latest = api.get(name).await?;
    let mut modified = latest.clone();
    modify(&mut modified);

    let before = serde_json::to_value(&latest)?;
    let after = serde_json::to_value(&modified)?;
    let old_status = before.get("status").cloned().unwrap_or(Value::Null);
    let new_status = after.get("status").cloned().unwrap_or(Value::Null);
    if old_status == new_status {
        return Ok(latest);
    }

    let params = PatchParams::default();
    let patched = if old_status.is_null() {
        api.patch_status(name, &params, &Patch::Merge(json!({ "status": new_status })))
            .await?
    } else {
        let diff = json_patch::diff(&json!({ "status": old_status }), &json!({ "status": new_status }));
        api.patch_status(name, &params, &Patch::Json::<()>(diff)).await?
    };
    Ok(patched)
}

/// Apply a spec/metadata change to the latest stored Cluster.
///
/// Status changes are rejected; they must go through [`patch_status`].
pub async fn update_cluster<F>(api: &Api<Cluster>, name: &str, modify: F) -> Result<Cluster>
where
    F: FnOnce(&mut Cluster),
{
    update_cluster_validated(api, name, modify, |_, _| Ok(())).await
}

/// Like [`update_cluster`], with an additional check of the `(new, old)` pair
pub async fn update_cluster_validated<F, V>(
    api: &Api<Cluster>,
    name: &str,
    modify: F,
    validate: V,
) -> Result<Cluster>
where
    F: FnOnce(&mut Cluster),
    V: FnOnce(&Cluster, &Cluster) -> Result<()>,
{
    let latest = api.get(name).await?;
    let mut modified = latest.clone();
    modify(&mut modified);

    if modified == latest {
        return Ok(latest);
    }
    if modified.status != latest.status {
        return Err(SeedkeeperError::StatusMutation);
    }
    validate_cluster_update(&modified, &latest)?;
    validate(&modified, &latest)?;

    patch_guarded(api, &latest, &modified).await
}
