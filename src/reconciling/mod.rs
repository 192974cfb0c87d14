// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Idempotent create-or-update of named child objects.
//!
//! A [`NamedObjectCreator`] pairs a stable object name with a pure transform
//! from the existing object (or `K::default()` when absent) to the desired one.
//! [`ensure_named_object`] fetches the live object, runs the transform on a copy
//! and only writes when a field set by the transform differs from the live
//! object. Fields the transform leaves unset are owned by someone else
//! (server defaults, other controllers) and never trigger a write.

use crate::error::{Result, SeedkeeperError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Transform from the existing object to the desired object. Must not perform I/O.
pub type ObjectCreator<K> = Box<dyn Fn(K) -> Result<K> + Send + Sync>;

/// Post-processing applied to every desired object, in registration order
pub type ObjectModifier<K> = Arc<dyn Fn(K) -> Result<K> + Send + Sync>;

pub struct NamedObjectCreator<K> {
    pub name: String,
    pub create: ObjectCreator<K>,
}

impl<K> NamedObjectCreator<K> {
    pub fn new<F>(name: impl Into<String>, create: F) -> Self
    where
        F: Fn(K) -> Result<K> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            create: Box::new(create),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Recreated,
    Unchanged,
}

/// Kinds whose changes can only be applied by deleting and creating the object
fn requires_recreate<K: Resource<DynamicType = ()>>() -> bool {
    K::kind(&()) == "PodDisruptionBudget"
}

/// Ensure every creator's object exists with the desired state
pub async fn reconcile_objects<K>(
    api: &Api<K>,
    namespace: Option<&str>,
    creators: Vec<NamedObjectCreator<K>>,
    modifiers: &[ObjectModifier<K>],
) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Default + Serialize + DeserializeOwned + Debug,
{
    for creator in &creators {
        ensure_named_object(api, namespace, creator, modifiers)
            .await
            .map_err(|e| SeedkeeperError::Reconcile {
                kind: K::kind(&()).to_string(),
                name: match namespace {
                    Some(ns) => format!("{}/{}", ns, creator.name),
                    None => creator.name.clone(),
                },
                source: Box::new(e),
            })?;
    }
    Ok(())
}

#[instrument(skip(api, creator, modifiers), fields(kind = %K::kind(&()), name = %creator.name))]
pub async fn ensure_named_object<K>(
    api: &Api<K>,
    namespace: Option<&str>,
    creator: &NamedObjectCreator<K>,
    modifiers: &[ObjectModifier<K>],
) -> Result<Outcome>
where
    K: Resource<DynamicType = ()> + Clone + Default + Serialize + DeserializeOwned + Debug,
{
    let kind = K::kind(&());
    let Some(existing) = api.get_opt(&creator.name).await? else {
        let desired = build_desired(creator, K::default(), namespace, modifiers)?;
        return match api.create(&PostParams::default(), &desired).await {
            Ok(_) => {
                info!("Created {} {}", kind, creator.name);
                Ok(Outcome::Created)
            }
            Err(kube::Error::Api(err)) if err.code == 409 => {
                // created concurrently; the next reconcile compares against it
                debug!("{} {} appeared while creating it", kind, creator.name);
                Ok(Outcome::Unchanged)
            }
            Err(e) => Err(e.into()),
        };
    };

    let desired = build_desired(creator, existing.clone(), namespace, modifiers)?;
    if is_subset(&serde_json::to_value(&desired)?, &serde_json::to_value(&existing)?) {
        debug!("{} {} is up to date", kind, creator.name);
        return Ok(Outcome::Unchanged);
    }

    if requires_recreate::<K>() {
        api.delete(&creator.name, &DeleteParams::default()).await?;
        let mut fresh = desired;
        let meta = fresh.meta_mut();
        meta.resource_version = None;
        meta.uid = None;
        meta.creation_timestamp = None;
        meta.managed_fields = None;
        api.create(&PostParams::default(), &fresh).await?;
        info!("Recreated {} {}", kind, creator.name);
        return Ok(Outcome::Recreated);
    }

    api.replace(&creator.name, &PostParams::default(), &desired).await?;
    info!("Updated {} {}", kind, creator.name);
    Ok(Outcome::Updated)
}

fn build_desired<K>(
    creator: &NamedObjectCreator<K>,
    base: K,
    namespace: Option<&str>,
    modifiers: &[ObjectModifier<K>],
) -> Result<K>
where
    K: Resource,
{
    let mut obj = (creator.create)(base)?;
    obj.meta_mut().name = Some(creator.name.clone());
    if let Some(ns) = namespace {
        obj.meta_mut().namespace = Some(ns.to_string());
    }
    for modify in modifiers {
        obj = modify(obj)?;
    }
    Ok(obj)
}

/// True when every field set in `desired` has the same value in `existing`
fn is_subset(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(e)) => d.iter().all(|(k, v)| match e.get(k) {
            Some(ev) => is_subset(v, ev),
            None => v.is_null() || is_empty_container(v),
        }),
        (Value::Object(d), Value::Null) => d.values().all(|v| v.is_null() || is_empty_container(v)),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(dv, ev)| is_subset(dv, ev))
        }
        (d, e) => d == e,
    }
}

fn is_empty_container(v: &Value) -> bool {
    match v {
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Sets `owner` as the controlling owner of every object
pub fn owner_reference_modifier<K: Resource>(owner: Option<OwnerReference>) -> ObjectModifier<K> {
    Arc::new(move |mut obj: K| {
        if let Some(owner) = &owner {
            let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
            refs.retain(|r| r.uid != owner.uid && r.controller != Some(true));
            refs.push(owner.clone());
        }
        Ok(obj)
    })
}

/// Forces every object into `namespace`
pub fn namespace_modifier<K: Resource>(namespace: impl Into<String>) -> ObjectModifier<K> {
    let namespace = namespace.into();
    Arc::new(move |mut obj: K| {
        obj.meta_mut().namespace = Some(namespace.clone());
        Ok(obj)
    })
}

/// Adds labels to every object, keeping labels set by others
pub fn labels_modifier<K: Resource>(labels: Vec<(String, String)>) -> ObjectModifier<K> {
    Arc::new(move |mut obj: K| {
        let existing = obj.labels_mut();
        for (k, v) in &labels {
            existing.insert(k.clone(), v.clone());
        }
        Ok(obj)
    })
}
