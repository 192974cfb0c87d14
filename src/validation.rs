// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Checks applied to every spec change written by the controllers.
//!
//! Admission enforces the same rules for user edits; the controllers re-check
//! them so a provider never persists a change that would be rejected anyway.

use crate::constants::features;
use crate::error::{Result, SeedkeeperError};
use crate::types::cluster::Cluster;

/// Validate a transition from `old` to `new`
pub fn validate_cluster_update(new: &Cluster, old: &Cluster) -> Result<()> {
    new.spec.cloud.provider_kind()?;

    if new.spec.cloud.datacenter_name != old.spec.cloud.datacenter_name {
        return Err(SeedkeeperError::ImmutableField(format!(
            "changing the datacenter is not allowed (was {}, updated to {})",
            old.spec.cloud.datacenter_name, new.spec.cloud.datacenter_name
        )));
    }

    let old_kind = old.spec.cloud.provider_kind()?;
    let new_kind = new.spec.cloud.provider_kind()?;
    if old_kind != new_kind {
        return Err(SeedkeeperError::ImmutableField(format!(
            "changing the cloud provider is not allowed (was {}, updated to {})",
            old_kind, new_kind
        )));
    }

    for feature in [features::EXTERNAL_CLOUD_PROVIDER, features::ETCD_LAUNCHER] {
        if old.feature_enabled(feature) && !new.feature_enabled(feature) {
            return Err(SeedkeeperError::ImmutableField(format!(
                "feature gate {:?} cannot be disabled once enabled",
                feature
            )));
        }
    }

    if old.feature_enabled(features::ENCRYPTION_AT_REST)
        && !new.feature_enabled(features::ENCRYPTION_AT_REST)
        && old.encryption_active()
    {
        return Err(SeedkeeperError::ImmutableField(
            "encryption at rest cannot be disabled while encryption is active".to_string(),
        ));
    }

    if let Some(old_strategy) = old.spec.expose_strategy {
        if new.spec.expose_strategy != Some(old_strategy) {
            return Err(SeedkeeperError::ImmutableField(format!(
                "expose strategy is immutable (was {:?})",
                old_strategy
            )));
        }
    }

    let old_range = &old.spec.components_override.apiserver.node_port_range;
    let new_range = &new.spec.components_override.apiserver.node_port_range;
    if old_range.is_some() && old_range != new_range {
        return Err(SeedkeeperError::ImmutableField(format!(
            "node port range is immutable (was {})",
            old_range.as_deref().unwrap_or_default()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_cluster;
    use crate::types::cloud::{BringYourOwnCloudSpec, PacketCloudSpec};
    use crate::types::cluster::{ClusterEncryptionStatus, ClusterStatus, ExposeStrategy};

    #[test]
    fn test_unchanged_cluster_is_valid() {
        let cluster = make_cluster("abc");
        assert!(validate_cluster_update(&cluster, &cluster).is_ok());
    }

    #[test]
    fn test_datacenter_change_rejected() {
        let old = make_cluster("abc");
        let mut new = old.clone();
        new.spec.cloud.datacenter_name = "azure-eastus".to_string();

        let err = validate_cluster_update(&new, &old).unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("datacenter"));
    }

    #[test]
    fn test_provider_change_rejected() {
        let old = make_cluster("abc");
        let mut new = old.clone();
        new.spec.cloud.bringyourown = None;
        new.spec.cloud.packet = Some(PacketCloudSpec::default());

        let err = validate_cluster_update(&new, &old).unwrap_err();
        assert!(err.to_string().contains("cloud provider"));
    }

    #[test]
    fn test_two_providers_rejected() {
        let old = make_cluster("abc");
        let mut new = old.clone();
        new.spec.cloud.bringyourown = Some(BringYourOwnCloudSpec {});
        new.spec.cloud.packet = Some(PacketCloudSpec::default());

        let err = validate_cluster_update(&new, &old).unwrap_err();
        assert!(err.to_string().contains("only one cloud provider"));
    }

    #[test]
    fn test_one_way_features() {
        let mut old = make_cluster("abc");
        old.spec.features.insert(features::ETCD_LAUNCHER.to_string(), true);
        let mut new = old.clone();
        new.spec.features.insert(features::ETCD_LAUNCHER.to_string(), false);
        assert!(validate_cluster_update(&new, &old).is_err());

        // enabling is always fine
        assert!(validate_cluster_update(&old, &new).is_ok());
    }

    #[test]
    fn test_encryption_cannot_be_disabled_while_active() {
        let mut old = make_cluster("abc");
        old.spec.features.insert(features::ENCRYPTION_AT_REST.to_string(), true);
        let mut new = old.clone();
        new.spec.features.remove(features::ENCRYPTION_AT_REST);
        assert!(validate_cluster_update(&new, &old).is_ok());

        old.status = Some(ClusterStatus {
            encryption: Some(ClusterEncryptionStatus {
                phase: "Active".to_string(),
            }),
            ..Default::default()
        });
        assert!(validate_cluster_update(&new, &old).is_err());
    }

    #[test]
    fn test_expose_strategy_immutable_once_set() {
        let old = make_cluster("abc");
        let mut new = old.clone();
        new.spec.expose_strategy = Some(ExposeStrategy::LoadBalancer);
        assert!(validate_cluster_update(&new, &old).is_ok());

        let mut changed = new.clone();
        changed.spec.expose_strategy = Some(ExposeStrategy::NodePort);
        assert!(validate_cluster_update(&changed, &new).is_err());
    }

    #[test]
    fn test_node_port_range_immutable_once_set() {
        let mut old = make_cluster("abc");
        old.spec.components_override.apiserver.node_port_range = Some("30000-32767".to_string());
        let mut new = old.clone();
        new.spec.components_override.apiserver.node_port_range = Some("31000-32000".to_string());
        assert!(validate_cluster_update(&new, &old).is_err());
    }
}
