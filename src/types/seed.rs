// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Seed and datacenter configuration. Read-only for the controllers.

use crate::error::{Result, SeedkeeperError};
use crate::types::cloud::ProviderKind;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "kubermatic.k8c.io", version = "v1", kind = "Seed")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct SeedSpec {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub datacenters: BTreeMap<String, Datacenter>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Datacenter {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub location: String,
    pub spec: DatacenterSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<DatacenterSpecAzure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<DatacenterSpecPacket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bringyourown: Option<DatacenterSpecBringYourOwn>,
}

impl DatacenterSpec {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        match (&self.azure, &self.packet, &self.bringyourown) {
            (Some(_), None, None) => Ok(ProviderKind::Azure),
            (None, Some(_), None) => Ok(ProviderKind::Packet),
            (None, None, Some(_)) => Ok(ProviderKind::BringYourOwn),
            _ => Err(SeedkeeperError::InvalidCloudSpec(
                "datacenter must declare exactly one provider".to_string(),
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpecAzure {
    pub location: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpecPacket {
    #[serde(default)]
    pub facilities: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metro: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct DatacenterSpecBringYourOwn {}

impl Seed {
    pub fn datacenter(&self, name: &str) -> Result<&Datacenter> {
        self.spec
            .datacenters
            .get(name)
            .ok_or_else(|| SeedkeeperError::DatacenterNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datacenter_lookup() {
        let seed = Seed::new(
            "europe-west",
            SeedSpec {
                datacenters: BTreeMap::from([(
                    "azure-westeurope".to_string(),
                    Datacenter {
                        spec: DatacenterSpec {
                            azure: Some(DatacenterSpecAzure {
                                location: "westeurope".to_string(),
                            }),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                )]),
                ..Default::default()
            },
        );

        let dc = seed.datacenter("azure-westeurope").unwrap();
        assert_eq!(dc.spec.provider_kind().unwrap(), ProviderKind::Azure);
        assert!(matches!(
            seed.datacenter("missing"),
            Err(SeedkeeperError::DatacenterNotFound(_))
        ));
    }

    #[test]
    fn test_datacenter_without_provider() {
        assert!(DatacenterSpec::default().provider_kind().is_err());
    }
}
