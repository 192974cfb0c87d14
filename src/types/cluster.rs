// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{components, labels};
use crate::types::cloud::CloudSpec;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "kubermatic.k8c.io", version = "v1", kind = "Cluster")]
#[kube(status = "ClusterStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub human_readable_name: String,
    pub version: String,
    pub cloud: CloudSpec,
    #[serde(default)]
    pub cluster_network: ClusterNetworkingConfig,
    #[serde(default)]
    pub components_override: ComponentSettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_strategy: Option<ExposeStrategy>,
    #[serde(default)]
    pub pause: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pause_reason: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ExposeStrategy {
    NodePort,
    LoadBalancer,
    Tunneling,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum IpFamily {
    IPv4,
    #[serde(rename = "IPv4+IPv6")]
    DualStack,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkingConfig {
    #[serde(default)]
    pub pods: NetworkRanges,
    #[serde(default)]
    pub services: NetworkRanges,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<IpFamily>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSettings {
    #[serde(default)]
    pub apiserver: ApiServerSettings,
    #[serde(default)]
    pub controller_manager: ControllerSettings,
    #[serde(default)]
    pub scheduler: ControllerSettings,
    #[serde(default)]
    pub etcd: EtcdSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port_range: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub leader_election: LeaderElectionSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_deadline_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_period_seconds: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_size: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default)]
    pub versions: ClusterVersionsStatus,
    #[serde(default)]
    pub extended_health: ExtendedClusterHealth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<ClusterEncryptionStatus>,
    #[serde(default)]
    pub conditions: BTreeMap<String, Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionsStatus {
    #[serde(default)]
    pub control_plane: String,
    #[serde(default)]
    pub apiserver: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum HealthStatus {
    #[default]
    #[serde(rename = "HealthStatusDown")]
    Down,
    #[serde(rename = "HealthStatusUp")]
    Up,
    #[serde(rename = "HealthStatusProvisioning")]
    Provisioning,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedClusterHealth {
    #[serde(default)]
    pub apiserver: HealthStatus,
    #[serde(default)]
    pub scheduler: HealthStatus,
    #[serde(default)]
    pub controller: HealthStatus,
    #[serde(default)]
    pub etcd: HealthStatus,
    #[serde(default)]
    pub cloud_provider_infrastructure: HealthStatus,
}

impl ExtendedClusterHealth {
    /// Control plane components, without the cloud infrastructure
    pub fn control_plane_healthy(&self) -> bool {
        [self.apiserver, self.scheduler, self.controller, self.etcd]
            .iter()
            .all(|h| *h == HealthStatus::Up)
    }

    pub fn all_healthy(&self) -> bool {
        self.control_plane_healthy() && self.cloud_provider_infrastructure == HealthStatus::Up
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEncryptionStatus {
    #[serde(default)]
    pub phase: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// A condition record, keyed by its type in the owning status map
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Cluster {
    /// Namespace hosting the control plane of this cluster
    pub fn namespace_name(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.namespace_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_namespace_name(&self.name_any()))
    }

    pub fn control_plane_version(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.versions.control_plane.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.spec.pause
    }

    /// A missing worker-name label belongs to the unnamed worker
    pub fn matches_worker(&self, worker_name: &str) -> bool {
        self.labels()
            .get(labels::WORKER_NAME)
            .map(String::as_str)
            .unwrap_or("")
            == worker_name
    }

    pub fn health(&self) -> ExtendedClusterHealth {
        self.status
            .as_ref()
            .map(|s| s.extended_health.clone())
            .unwrap_or_default()
    }

    /// A cluster is mid-update while the apiserver runs a different version than
    /// requested or while its control plane has not settled
    pub fn is_update_in_progress(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return true;
        };
        status.versions.apiserver != status.versions.control_plane
            || !status.extended_health.control_plane_healthy()
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status.as_ref()?.conditions.get(condition_type)
    }

    pub fn condition_is_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.spec.features.get(feature).copied().unwrap_or(false)
    }

    pub fn encryption_active(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.encryption.as_ref())
            .is_some_and(|e| !e.phase.is_empty())
    }

    /// Address of the apiserver service inside the seed
    pub fn apiserver_address(&self) -> String {
        format!(
            "{}.{}.svc.cluster.local",
            components::APISERVER,
            self.namespace_name()
        )
    }
}

pub fn default_namespace_name(cluster_name: &str) -> String {
    format!("cluster-{}", cluster_name)
}
