// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-provider cloud specs embedded in Cluster and Seed objects.

use crate::error::{Result, SeedkeeperError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The supported infrastructure backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Azure,
    Packet,
    BringYourOwn,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azure",
            ProviderKind::Packet => "packet",
            ProviderKind::BringYourOwn => "bringyourown",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a key of a Secret anywhere in the seed
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSecretKeySelector {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    #[serde(rename = "dc")]
    pub datacenter_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<PacketCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bringyourown: Option<BringYourOwnCloudSpec>,
}

impl CloudSpec {
    /// The single populated provider; zero or several populated is a fatal spec error
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        let mut kinds = Vec::new();
        if self.azure.is_some() {
            kinds.push(ProviderKind::Azure);
        }
        if self.packet.is_some() {
            kinds.push(ProviderKind::Packet);
        }
        if self.bringyourown.is_some() {
            kinds.push(ProviderKind::BringYourOwn);
        }

        match kinds.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(SeedkeeperError::InvalidCloudSpec(
                "no cloud provider specified".to_string(),
            )),
            _ => Err(SeedkeeperError::InvalidCloudSpec(format!(
                "only one cloud provider may be specified, found {}",
                kinds.iter().map(ProviderKind::as_str).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Secret reference holding the provider credentials, if any
    pub fn credentials_reference(&self) -> Option<&GlobalSecretKeySelector> {
        if let Some(azure) = &self.azure {
            return azure.credentials_reference.as_ref();
        }
        if let Some(packet) = &self.packet {
            return packet.credentials_reference.as_ref();
        }
        None
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
    #[serde(default, rename = "tenantID")]
    pub tenant_id: String,
    #[serde(default, rename = "subscriptionID")]
    pub subscription_id: String,
    #[serde(default, rename = "clientID")]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub vnet_resource_group: String,
    #[serde(default, rename = "vnet")]
    pub vnet_name: String,
    #[serde(default, rename = "subnet")]
    pub subnet_name: String,
    #[serde(default, rename = "routeTable")]
    pub route_table_name: String,
    #[serde(default)]
    pub security_group: String,
    #[serde(default)]
    pub availability_set: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_availability_set: Option<bool>,
    #[serde(default, rename = "loadBalancerSKU")]
    pub load_balancer_sku: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PacketCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, rename = "projectID")]
    pub project_id: String,
    #[serde(default)]
    pub billing_cycle: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct BringYourOwnCloudSpec {}
