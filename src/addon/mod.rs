// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Addon manifests: template rendering, labeling and combining.
//!
//! An addon is a directory `<addon_dir>/<name>/` of YAML templates. Every
//! template is rendered with [`TemplateData`], split into documents, and each
//! object gets the `kubermatic-addon=<name>` label that scopes pruning.

pub mod applier;

use crate::constants::addon::MANIFEST_SEPARATOR;
use crate::constants::labels;
use crate::error::{Result, SeedkeeperError};
use crate::kubernetes::SecretKeyGetter;
use crate::provider::credential;
use crate::types::cloud::CloudSpec;
use crate::types::cluster::Cluster;
use kube::ResourceExt;
use minijinja::{Environment, UndefinedBehavior, Value as TemplateValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::debug;

pub use applier::{KubectlApplier, ManifestApplier};

const DEFAULT_DNS_DOMAIN: &str = "cluster.local";
const DEFAULT_SERVICE_CIDR: &str = "10.240.16.0/20";
/// Offset of the cluster DNS service in the service network
const DNS_SERVICE_OFFSET: u32 = 10;

#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterData {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub cloud_provider_name: String,
    pub pod_cidr_blocks: Vec<String>,
    pub service_cidr_blocks: Vec<String>,
    pub dns_domain: String,
    pub dns_cluster_ip: String,
    pub proxy_mode: String,
    pub features: BTreeMap<String, bool>,
}

/// Everything a template may reference
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateData {
    pub cluster: ClusterData,
    pub credentials: BTreeMap<String, String>,
    pub kubeconfig: String,
    pub variables: Value,
}

impl TemplateData {
    pub fn new(
        cluster: &Cluster,
        credentials: BTreeMap<String, String>,
        kubeconfig: String,
        variables: Option<Value>,
    ) -> Result<Self> {
        let network = &cluster.spec.cluster_network;
        let service_cidr_blocks = if network.services.cidr_blocks.is_empty() {
            vec![DEFAULT_SERVICE_CIDR.to_string()]
        } else {
            network.services.cidr_blocks.clone()
        };
        let dns_cluster_ip = dns_cluster_ip(&service_cidr_blocks[0])?;
        let cloud_provider_name = cluster.spec.cloud.provider_kind()?.to_string();

        Ok(Self {
            cluster: ClusterData {
                name: cluster.name_any(),
                namespace: cluster.namespace_name(),
                version: cluster.control_plane_version().unwrap_or_default().to_string(),
                cloud_provider_name,
                pod_cidr_blocks: network.pods.cidr_blocks.clone(),
                service_cidr_blocks,
                dns_domain: Some(network.dns_domain.clone())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| DEFAULT_DNS_DOMAIN.to_string()),
                dns_cluster_ip,
                proxy_mode: network.proxy_mode.clone(),
                features: cluster.spec.features.clone(),
            },
            credentials,
            kubeconfig,
            variables: variables.unwrap_or_else(|| Value::Object(Default::default())),
        })
    }
}

/// The tenth address of the IPv4 service network, where cluster DNS lives
pub fn dns_cluster_ip(cidr: &str) -> Result<String> {
    let invalid = || SeedkeeperError::InvalidCloudSpec(format!("invalid service CIDR {:?}", cidr));
    let (network, _) = cidr.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = network.parse().map_err(|_| invalid())?;
    let ip = u32::from(address).checked_add(DNS_SERVICE_OFFSET).ok_or_else(invalid)?;
    Ok(Ipv4Addr::from(ip).to_string())
}

/// Provider credentials handed to addon templates
pub async fn credentials(secrets: &dyn SecretKeyGetter, cloud: &CloudSpec) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let reference = cloud.credentials_reference();
    if let Some(azure) = &cloud.azure {
        for (key, inline) in [
            ("tenantID", &azure.tenant_id),
            ("subscriptionID", &azure.subscription_id),
            ("clientID", &azure.client_id),
            ("clientSecret", &azure.client_secret),
        ] {
            values.insert(key.to_string(), credential(secrets, "Azure", inline, reference, key).await?);
        }
    }
    if let Some(packet) = &cloud.packet {
        for (key, inline) in [("apiKey", &packet.api_key), ("projectID", &packet.project_id)] {
            values.insert(key.to_string(), credential(secrets, "Packet", inline, reference, key).await?);
        }
    }
    Ok(values)
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env
}

/// Render and label every template of the addon `name`, in file name order
pub fn render_addon(addon_dir: &Path, name: &str, data: &TemplateData) -> Result<Vec<Value>> {
    let dir = addon_dir.join(name);
    let mut files: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    files.sort();

    let env = environment();
    let context = TemplateValue::from_serialize(data);
    let mut objects = Vec::new();
    for file in files {
        debug!("Rendering addon template {}", file.display());
        let template = std::fs::read_to_string(&file)?;
        let rendered = env.render_str(&template, &context)?;
        for object in parse_documents(&rendered)? {
            objects.push(label_object(object, name)?);
        }
    }
    Ok(objects)
}

/// All non-empty YAML documents of a multi-document string
pub fn parse_documents(manifest: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

fn label_object(mut object: Value, addon: &str) -> Result<Value> {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return Err(SeedkeeperError::AddonCommand(format!(
            "addon {} renders an object without metadata",
            addon
        )));
    };
    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Default::default()));
    if labels.is_null() {
        *labels = Value::Object(Default::default());
    }
    if let Some(labels) = labels.as_object_mut() {
        labels.insert(labels::ADDON.to_string(), Value::String(addon.to_string()));
    }
    Ok(object)
}

/// One multi-document manifest of all objects
pub fn combine_manifests(objects: &[Value]) -> Result<String> {
    let documents = objects
        .iter()
        .map(serde_yaml::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(documents.join(MANIFEST_SEPARATOR))
}
