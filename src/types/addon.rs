// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::labels;
use crate::types::cluster::{Condition, ConditionStatus};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "kubermatic.k8c.io", version = "v1", kind = "Addon")]
#[kube(namespaced)]
#[kube(status = "AddonStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Name of the addon template directory
    pub name: String,
    pub cluster: ClusterReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    /// Kinds that must be served by the tenant cluster before applying
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_resource_types: Vec<RequiredResourceType>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct ClusterReference {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct RequiredResourceType {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    #[serde(default)]
    pub conditions: BTreeMap<String, Condition>,
}

impl Addon {
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn condition_is_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.get(condition_type))
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Whether applied resources are enforced on every reconcile
    pub fn ensure_resources(&self) -> bool {
        self.labels()
            .get(labels::ADDON_ENSURE)
            .is_some_and(|v| v == "true")
    }
}
