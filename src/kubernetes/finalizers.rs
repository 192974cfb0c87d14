// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Finalizers as an ordered, duplicate-free set, and helpers to persist changes.

use crate::error::Result;
use crate::kubernetes::patch::patch_guarded;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::info;

/// The finalizer list of an object. Keeps insertion order and never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizerSet(Vec<String>);

impl FinalizerSet {
    pub fn of<K: Resource>(obj: &K) -> Self {
        obj.finalizers().iter().cloned().collect()
    }

    pub fn has(&self, finalizer: &str) -> bool {
        self.0.iter().any(|f| f == finalizer)
    }

    pub fn has_any(&self, finalizers: &[&str]) -> bool {
        finalizers.iter().any(|f| self.has(f))
    }

    /// True when `finalizer` is the only entry
    pub fn has_only(&self, finalizer: &str) -> bool {
        self.0.len() == 1 && self.0[0] == finalizer
    }

    /// Returns true when the finalizer was not present yet
    pub fn add(&mut self, finalizer: &str) -> bool {
        if self.has(finalizer) {
            return false;
        }
        self.0.push(finalizer.to_string());
        true
    }

    /// Returns true when the finalizer was present
    pub fn remove(&mut self, finalizer: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|f| f != finalizer);
        self.0.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl FromIterator<String> for FinalizerSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = FinalizerSet::default();
        for f in iter {
            set.add(&f);
        }
        set
    }
}

/// Add finalizers to an object if missing, returning the stored object
pub async fn add_finalizers<K>(api: &Api<K>, obj: &K, finalizers: &[&str]) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let mut set = FinalizerSet::of(obj);
    let mut changed = false;
    for f in finalizers {
        changed |= set.add(f);
    }
    if !changed {
        return Ok(obj.clone());
    }

    info!("Adding finalizers {:?} to {}", finalizers, obj.name_any());
    write_finalizers(api, obj, set).await
}

/// Remove finalizers from an object if present, returning the stored object.
///
/// Removing the last finalizer of a deleting object lets the API server drop it.
pub async fn remove_finalizers<K>(api: &Api<K>, obj: &K, finalizers: &[&str]) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let mut set = FinalizerSet::of(obj);
    let mut changed = false;
    for f in finalizers {
        changed |= set.remove(f);
    }
    if !changed {
        return Ok(obj.clone());
    }

    info!("Removing finalizers {:?} from {}", finalizers, obj.name_any());
    write_finalizers(api, obj, set).await
}

async fn write_finalizers<K>(api: &Api<K>, obj: &K, set: FinalizerSet) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let mut modified = obj.clone();
    modified.meta_mut().finalizers = Some(set.into_vec());
    patch_guarded(api, obj, &modified).await
}
