// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Azure infrastructure for a cluster.
//!
//! The resource group, VNet, subnet, route table, security group and
//! availability set are created in that order. Each created resource name is
//! written back to the cluster spec together with its cleanup finalizer
//! before the next one is attempted. Resources that already exist without our
//! ownership tag are used but never modified or deleted.

pub mod arm;

use crate::error::{CloudApiError, Result, SeedkeeperError};
use crate::kubernetes::{FinalizerSet, SecretKeyGetter};
use crate::provider::{credential, CloudProvider, ClusterUpdater};
use crate::types::cloud::{AzureCloudSpec, CloudSpec, ProviderKind};
use crate::types::cluster::Cluster;
use crate::types::seed::DatacenterSpecAzure;
use arm::{ArmApi, ArmConnector, AzureCredentials, Deletion, ResourceId};
use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const FINALIZER_SECURITY_GROUP: &str = "kubermatic.k8c.io/cleanup-azure-security-group";
pub const FINALIZER_ROUTE_TABLE: &str = "kubermatic.k8c.io/cleanup-azure-route-table";
pub const FINALIZER_SUBNET: &str = "kubermatic.k8c.io/cleanup-azure-subnet";
pub const FINALIZER_VNET: &str = "kubermatic.k8c.io/cleanup-azure-vnet";
pub const FINALIZER_RESOURCE_GROUP: &str = "kubermatic.k8c.io/cleanup-azure-resource-group";
pub const FINALIZER_AVAILABILITY_SET: &str = "kubermatic.k8c.io/cleanup-azure-availability-set";

const RESOURCE_NAME_PREFIX: &str = "kubernetes-";
/// Tag marking a resource as created for the named cluster
const OWNERSHIP_TAG: &str = "cluster";

const DEFAULT_LOAD_BALANCER_SKU: &str = "basic";
const DEFAULT_NODE_PORT_RANGE: &str = "30000-32767";
const VNET_ADDRESS_SPACE: &str = "10.0.0.0/16";
const SUBNET_ADDRESS_PREFIX: &str = "10.0.0.0/16";
const UPDATE_DOMAIN_COUNT: u32 = 20;

const TENANT_ID_KEY: &str = "tenantID";
const SUBSCRIPTION_ID_KEY: &str = "subscriptionID";
const CLIENT_ID_KEY: &str = "clientID";
const CLIENT_SECRET_KEY: &str = "clientSecret";

pub const DENY_ALL_TCP_RULE: &str = "deny_all_tcp";
pub const DENY_ALL_UDP_RULE: &str = "deny_all_udp";
pub const ALLOW_ALL_ICMP_RULE: &str = "icmp_by_allow_all";

/// Platform fault domains available per region
const FAULT_DOMAINS_PER_REGION: &[(&str, u32)] = &[
    ("australiacentral", 2),
    ("australiaeast", 2),
    ("australiasoutheast", 2),
    ("brazilsouth", 2),
    ("canadacentral", 3),
    ("canadaeast", 2),
    ("centralindia", 3),
    ("centralus", 3),
    ("eastasia", 2),
    ("eastus", 3),
    ("eastus2", 3),
    ("francecentral", 3),
    ("germanywestcentral", 2),
    ("japaneast", 3),
    ("japanwest", 2),
    ("koreacentral", 2),
    ("northcentralus", 3),
    ("northeurope", 3),
    ("norwayeast", 2),
    ("southafricanorth", 2),
    ("southcentralus", 3),
    ("southeastasia", 2),
    ("southindia", 2),
    ("swedencentral", 3),
    ("switzerlandnorth", 2),
    ("uksouth", 2),
    ("ukwest", 2),
    ("westcentralus", 2),
    ("westeurope", 3),
    ("westindia", 2),
    ("westus", 3),
    ("westus2", 2),
    ("westus3", 2),
];

fn fault_domain_count(location: &str) -> Result<u32> {
    FAULT_DOMAINS_PER_REGION
        .iter()
        .find(|(region, _)| *region == location)
        .map(|(_, count)| *count)
        .ok_or_else(|| {
            SeedkeeperError::InvalidCloudSpec(format!(
                "could not determine the number of fault domains, unknown region {:?}",
                location
            ))
        })
}

fn azure_spec(cloud: &CloudSpec) -> Result<&AzureCloudSpec> {
    cloud
        .azure
        .as_ref()
        .ok_or_else(|| SeedkeeperError::InvalidCloudSpec("cluster has no Azure cloud spec".to_string()))
}

fn vnet_resource_group(spec: &AzureCloudSpec) -> String {
    if spec.vnet_resource_group.is_empty() {
        spec.resource_group.clone()
    } else {
        spec.vnet_resource_group.clone()
    }
}

fn name_or_default(current: &str, cluster: &Cluster) -> String {
    if current.is_empty() {
        format!("{}{}", RESOURCE_NAME_PREFIX, cluster.name_any())
    } else {
        current.to_string()
    }
}

fn ownership_tags(cluster: &Cluster) -> Value {
    json!({ OWNERSHIP_TAG: cluster.name_any() })
}

fn has_ownership_tag(resource: &Value, cluster_name: &str) -> bool {
    resource["tags"][OWNERSHIP_TAG].as_str() == Some(cluster_name)
}

fn security_rule(name: &str, priority: u32, direction: &str, access: &str, protocol: &str, source: &str, ports: &str) -> Value {
    json!({
        "name": name,
        "properties": {
            "direction": direction,
            "access": access,
            "protocol": protocol,
            "priority": priority,
            "sourceAddressPrefix": source,
            "sourcePortRange": "*",
            "destinationAddressPrefix": "*",
            "destinationPortRange": ports,
        }
    })
}

/// Rules every security group of ours must carry, whatever else it holds
fn baseline_rules() -> Vec<Value> {
    vec![
        security_rule(DENY_ALL_TCP_RULE, 800, "Inbound", "Deny", "Tcp", "*", "*"),
        security_rule(DENY_ALL_UDP_RULE, 801, "Inbound", "Deny", "Udp", "*", "*"),
        security_rule(ALLOW_ALL_ICMP_RULE, 900, "Inbound", "Allow", "Icmp", "*", "*"),
    ]
}

fn security_rules(cluster: &Cluster) -> Vec<Value> {
    let node_ports = cluster
        .spec
        .components_override
        .apiserver
        .node_port_range
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_NODE_PORT_RANGE.to_string());

    let mut rules = vec![
        security_rule("ssh_ingress", 100, "Inbound", "Allow", "Tcp", "*", "22"),
        security_rule("inter_node_comm", 200, "Inbound", "Allow", "*", SUBNET_ADDRESS_PREFIX, "*"),
        security_rule("azure_load_balancer", 300, "Inbound", "Allow", "*", "AzureLoadBalancer", "*"),
        security_rule("node_ports_ingress", 400, "Inbound", "Allow", "Tcp", "*", &node_ports),
        security_rule("node_ports_ingress_udp", 401, "Inbound", "Allow", "Udp", "*", &node_ports),
        security_rule("outbound_allow_all", 100, "Outbound", "Allow", "*", "*", "*"),
    ];
    rules.extend(baseline_rules());
    rules
}

pub struct AzureProvider {
    datacenter: DatacenterSpecAzure,
    secrets: Arc<dyn SecretKeyGetter>,
    connector: Arc<dyn ArmConnector>,
}

impl AzureProvider {
    pub fn new(
        datacenter: DatacenterSpecAzure,
        secrets: Arc<dyn SecretKeyGetter>,
        connector: Arc<dyn ArmConnector>,
    ) -> Self {
        Self {
            datacenter,
            secrets,
            connector,
        }
    }

    async fn credentials(&self, spec: &AzureCloudSpec) -> Result<AzureCredentials> {
        let secrets = self.secrets.as_ref();
        let reference = spec.credentials_reference.as_ref();
        Ok(AzureCredentials {
            tenant_id: credential(secrets, "Azure", &spec.tenant_id, reference, TENANT_ID_KEY).await?,
            subscription_id: credential(secrets, "Azure", &spec.subscription_id, reference, SUBSCRIPTION_ID_KEY)
                .await?,
            client_id: credential(secrets, "Azure", &spec.client_id, reference, CLIENT_ID_KEY).await?,
            client_secret: credential(secrets, "Azure", &spec.client_secret, reference, CLIENT_SECRET_KEY)
                .await?,
        })
    }

    async fn client(&self, spec: &AzureCloudSpec) -> Result<Arc<dyn ArmApi>> {
        Ok(self.connector.connect(self.credentials(spec).await?))
    }

    /// Create or update `id` if we own it, then persist its name.
    ///
    /// Ownership is read from the resource itself, or from `owner` for
    /// resources that carry no tags. A resource that does not exist yet is
    /// always ours.
    #[allow(clippy::too_many_arguments)]
    async fn ensure<B, P>(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
        id: ResourceId,
        owner: Option<ResourceId>,
        finalizer: &'static str,
        body: B,
        persist: P,
    ) -> Result<Cluster>
    where
        B: FnOnce(Option<&Value>) -> Value + Send,
        P: Fn(&mut AzureCloudSpec) + Send + Sync,
    {
        let cluster_name = cluster.name_any();
        let existing = get_optional(arm, &id).await?;

        let owned = match (&existing, &owner) {
            (None, _) => true,
            (Some(resource), None) => has_ownership_tag(resource, &cluster_name),
            (Some(_), Some(parent)) => has_ownership_tag(&arm.get(parent).await?, &cluster_name),
        };

        if owned {
            info!("Ensuring Azure {} for cluster {}", id, cluster_name);
            arm.put(&id, &body(existing.as_ref())).await?;
        } else {
            info!(
                "Using existing Azure {} for cluster {}, not owned by us",
                id, cluster_name
            );
        }

        updater
            .update(&cluster_name, &|c: &mut Cluster| {
                if let Some(azure) = c.spec.cloud.azure.as_mut() {
                    persist(azure);
                }
                if owned {
                    let mut finalizers = FinalizerSet::of(c);
                    if finalizers.add(finalizer) {
                        c.metadata.finalizers = Some(finalizers.into_vec());
                    }
                }
            })
            .await
    }

    async fn reconcile_resource_group(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let name = name_or_default(&azure_spec(&cluster.spec.cloud)?.resource_group, &cluster);
        let body = json!({
            "location": self.datacenter.location,
            "tags": ownership_tags(&cluster),
        });
        let id = ResourceId::ResourceGroup { name: name.clone() };

        self.ensure(arm, cluster, updater, id, None, FINALIZER_RESOURCE_GROUP, |_| body, move |azure| {
            azure.resource_group = name.clone()
        })
        .await
    }

    async fn reconcile_vnet(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        let name = name_or_default(&spec.vnet_name, &cluster);
        let id = ResourceId::VirtualNetwork {
            resource_group: vnet_resource_group(spec),
            name: name.clone(),
        };
        let mut body = json!({
            "location": self.datacenter.location,
            "tags": ownership_tags(&cluster),
            "properties": {
                "addressSpace": { "addressPrefixes": [VNET_ADDRESS_SPACE] },
            },
        });

        self.ensure(
            arm,
            cluster,
            updater,
            id,
            None,
            FINALIZER_VNET,
            move |existing| {
                // A VNet PUT without its subnets would try to delete them
                if let Some(subnets) = existing.map(|v| &v["properties"]["subnets"]).filter(|s| s.is_array()) {
                    body["properties"]["subnets"] = subnets.clone();
                }
                body
            },
            move |azure| azure.vnet_name = name.clone(),
        )
        .await
    }

    async fn reconcile_subnet(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        let name = name_or_default(&spec.subnet_name, &cluster);
        let resource_group = vnet_resource_group(spec);
        let vnet = ResourceId::VirtualNetwork {
            resource_group: resource_group.clone(),
            name: spec.vnet_name.clone(),
        };
        let id = ResourceId::Subnet {
            resource_group,
            vnet: spec.vnet_name.clone(),
            name: name.clone(),
        };
        let body = json!({
            "properties": { "addressPrefix": SUBNET_ADDRESS_PREFIX },
        });

        // Subnets carry no tags, they belong to whoever owns the VNet
        self.ensure(arm, cluster, updater, id, Some(vnet), FINALIZER_SUBNET, |_| body, move |azure| {
            azure.subnet_name = name.clone()
        })
        .await
    }

    async fn reconcile_route_table(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        let name = name_or_default(&spec.route_table_name, &cluster);
        let id = ResourceId::RouteTable {
            resource_group: spec.resource_group.clone(),
            name: name.clone(),
        };
        let body = json!({
            "location": self.datacenter.location,
            "tags": ownership_tags(&cluster),
            "properties": {},
        });

        self.ensure(arm, cluster, updater, id, None, FINALIZER_ROUTE_TABLE, |_| body, move |azure| {
            azure.route_table_name = name.clone()
        })
        .await
    }

    async fn reconcile_security_group(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        let name = name_or_default(&spec.security_group, &cluster);
        let id = ResourceId::SecurityGroup {
            resource_group: spec.resource_group.clone(),
            name: name.clone(),
        };
        let body = json!({
            "location": self.datacenter.location,
            "tags": ownership_tags(&cluster),
            "properties": { "securityRules": security_rules(&cluster) },
        });

        self.ensure(arm, cluster, updater, id, None, FINALIZER_SECURITY_GROUP, |_| body, move |azure| {
            azure.security_group = name.clone()
        })
        .await
    }

    async fn reconcile_availability_set(
        &self,
        arm: &dyn ArmApi,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        let name = name_or_default(&spec.availability_set, &cluster);
        let id = ResourceId::AvailabilitySet {
            resource_group: spec.resource_group.clone(),
            name: name.clone(),
        };
        let body = json!({
            "location": self.datacenter.location,
            "tags": ownership_tags(&cluster),
            "sku": { "name": "Aligned" },
            "properties": {
                "platformFaultDomainCount": fault_domain_count(&self.datacenter.location)?,
                "platformUpdateDomainCount": UPDATE_DOMAIN_COUNT,
            },
        });

        self.ensure(arm, cluster, updater, id, None, FINALIZER_AVAILABILITY_SET, |_| body, move |azure| {
            azure.availability_set = name.clone()
        })
        .await
    }

    /// Walk the resources in dependency order. Without `force` only the
    /// resources whose name is still missing from the spec are touched.
    #[instrument(skip(self, cluster, updater), fields(cluster = %cluster.name_any()))]
    async fn reconcile(
        &self,
        mut cluster: Cluster,
        updater: &dyn ClusterUpdater,
        force: bool,
    ) -> Result<Cluster> {
        let arm = self.client(azure_spec(&cluster.spec.cloud)?).await?;
        let arm = arm.as_ref();

        if force || azure_spec(&cluster.spec.cloud)?.resource_group.is_empty() {
            cluster = self.reconcile_resource_group(arm, cluster, updater).await?;
        }
        if force || azure_spec(&cluster.spec.cloud)?.vnet_name.is_empty() {
            cluster = self.reconcile_vnet(arm, cluster, updater).await?;
        }
        if force || azure_spec(&cluster.spec.cloud)?.subnet_name.is_empty() {
            cluster = self.reconcile_subnet(arm, cluster, updater).await?;
        }
        if force || azure_spec(&cluster.spec.cloud)?.route_table_name.is_empty() {
            cluster = self.reconcile_route_table(arm, cluster, updater).await?;
        }
        if force || azure_spec(&cluster.spec.cloud)?.security_group.is_empty() {
            cluster = self.reconcile_security_group(arm, cluster, updater).await?;
        }

        let spec = azure_spec(&cluster.spec.cloud)?;
        if spec.assign_availability_set.unwrap_or(true) && (force || spec.availability_set.is_empty()) {
            cluster = self.reconcile_availability_set(arm, cluster, updater).await?;
        }

        Ok(cluster)
    }

    /// Add the baseline rules missing from our security group in one update
    pub async fn add_icmp_rules_if_required(&self, cluster: &Cluster) -> Result<()> {
        let spec = azure_spec(&cluster.spec.cloud)?;
        if spec.security_group.is_empty() {
            return Ok(());
        }
        let arm = self.client(spec).await?;
        let id = ResourceId::SecurityGroup {
            resource_group: spec.resource_group.clone(),
            name: spec.security_group.clone(),
        };

        let mut group = arm.get(&id).await?;
        if !has_ownership_tag(&group, &cluster.name_any()) {
            debug!("Security group {} is not owned by us, leaving its rules alone", id);
            return Ok(());
        }

        let mut rules = group["properties"]["securityRules"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let missing: Vec<Value> = baseline_rules()
            .into_iter()
            .filter(|rule| !rules.iter().any(|existing| existing["name"] == rule["name"]))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        info!("Adding {} missing rules to security group {}", missing.len(), id);
        rules.extend(missing);
        group["properties"]["securityRules"] = Value::Array(rules);
        arm.put(&id, &group).await?;
        Ok(())
    }
}

async fn get_optional(arm: &dyn ArmApi, id: &ResourceId) -> Result<Option<Value>> {
    match arm.get(id).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn check_exists(arm: &dyn ArmApi, id: ResourceId, what: &str) -> Result<()> {
    arm.get(&id).await.map(|_| ()).map_err(|e| {
        SeedkeeperError::Cloud(CloudApiError::new(
            e.status,
            format!("failed to get {} {}: {}", what, id, e.message),
        ))
    })
}

fn check_unchanged(what: &str, old: &str, new: &str) -> Result<()> {
    if !old.is_empty() && old != new {
        return Err(SeedkeeperError::ImmutableField(format!(
            "updating Azure {} is not supported (was {}, updated to {})",
            what, old, new
        )));
    }
    Ok(())
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn default_cloud_spec(&self, spec: &mut CloudSpec) -> Result<()> {
        if let Some(azure) = spec.azure.as_mut() {
            if azure.load_balancer_sku.is_empty() {
                azure.load_balancer_sku = DEFAULT_LOAD_BALANCER_SKU.to_string();
            }
        }
        Ok(())
    }

    /// Client secrets stay out of the config; it lives in a ConfigMap.
    fn cloud_config(&self, spec: &CloudSpec) -> Result<String> {
        let azure = azure_spec(spec)?;
        let config = json!({
            "cloud": "AZUREPUBLICCLOUD",
            "tenantId": azure.tenant_id,
            "subscriptionId": azure.subscription_id,
            "location": self.datacenter.location,
            "resourceGroup": azure.resource_group,
            "vnetName": azure.vnet_name,
            "vnetResourceGroup": vnet_resource_group(azure),
            "subnetName": azure.subnet_name,
            "routeTableName": azure.route_table_name,
            "securityGroupName": azure.security_group,
            "primaryAvailabilitySetName": azure.availability_set,
            "loadBalancerSku": azure.load_balancer_sku,
            "useInstanceMetadata": true,
        });
        Ok(serde_json::to_string_pretty(&config)?)
    }

    async fn validate_cloud_spec(&self, spec: &CloudSpec) -> Result<()> {
        let azure = azure_spec(spec)?;
        let arm = self.client(azure).await?;
        let arm = arm.as_ref();
        let vnet_group = vnet_resource_group(azure);

        if !azure.resource_group.is_empty() {
            let id = ResourceId::ResourceGroup {
                name: azure.resource_group.clone(),
            };
            check_exists(arm, id, "resource group").await?;
        }
        if !azure.vnet_name.is_empty() {
            let id = ResourceId::VirtualNetwork {
                resource_group: vnet_group.clone(),
                name: azure.vnet_name.clone(),
            };
            check_exists(arm, id, "virtual network").await?;

            if !azure.subnet_name.is_empty() {
                let id = ResourceId::Subnet {
                    resource_group: vnet_group.clone(),
                    vnet: azure.vnet_name.clone(),
                    name: azure.subnet_name.clone(),
                };
                check_exists(arm, id, "subnet").await?;
            }
        }
        if !azure.route_table_name.is_empty() {
            let id = ResourceId::RouteTable {
                resource_group: azure.resource_group.clone(),
                name: azure.route_table_name.clone(),
            };
            check_exists(arm, id, "route table").await?;
        }
        if !azure.security_group.is_empty() {
            let id = ResourceId::SecurityGroup {
                resource_group: azure.resource_group.clone(),
                name: azure.security_group.clone(),
            };
            check_exists(arm, id, "security group").await?;
        }
        Ok(())
    }

    fn validate_cloud_spec_update(&self, old: &CloudSpec, new: &CloudSpec) -> Result<()> {
        let (Some(old), Some(new)) = (old.azure.as_ref(), new.azure.as_ref()) else {
            return Ok(());
        };

        check_unchanged("resource group", &old.resource_group, &new.resource_group)?;
        check_unchanged("vnet resource group", &old.vnet_resource_group, &new.vnet_resource_group)?;
        check_unchanged("vnet", &old.vnet_name, &new.vnet_name)?;
        check_unchanged("subnet", &old.subnet_name, &new.subnet_name)?;
        check_unchanged("route table", &old.route_table_name, &new.route_table_name)?;
        check_unchanged("security group", &old.security_group, &new.security_group)?;
        check_unchanged("availability set", &old.availability_set, &new.availability_set)
    }

    async fn initialize_cloud_provider(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        self.reconcile(cluster, updater, true).await
    }

    async fn reconcile_cluster(
        &self,
        cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let cluster = self.reconcile(cluster, updater, false).await?;
        self.add_icmp_rules_if_required(&cluster).await?;
        Ok(cluster)
    }

    #[instrument(skip(self, cluster, updater), fields(cluster = %cluster.name_any()))]
    async fn clean_up_cloud_provider(
        &self,
        mut cluster: Cluster,
        updater: &dyn ClusterUpdater,
    ) -> Result<Cluster> {
        let spec = azure_spec(&cluster.spec.cloud)?.clone();
        let arm = self.client(&spec).await?;
        let cluster_name = cluster.name_any();
        let vnet_group = vnet_resource_group(&spec);

        let steps = [
            (
                FINALIZER_SECURITY_GROUP,
                ResourceId::SecurityGroup {
                    resource_group: spec.resource_group.clone(),
                    name: spec.security_group.clone(),
                },
            ),
            (
                FINALIZER_ROUTE_TABLE,
                ResourceId::RouteTable {
                    resource_group: spec.resource_group.clone(),
                    name: spec.route_table_name.clone(),
                },
            ),
            (
                FINALIZER_SUBNET,
                ResourceId::Subnet {
                    resource_group: vnet_group.clone(),
                    vnet: spec.vnet_name.clone(),
                    name: spec.subnet_name.clone(),
                },
            ),
            (
                FINALIZER_VNET,
                ResourceId::VirtualNetwork {
                    resource_group: vnet_group,
                    name: spec.vnet_name.clone(),
                },
            ),
            (
                FINALIZER_AVAILABILITY_SET,
                ResourceId::AvailabilitySet {
                    resource_group: spec.resource_group.clone(),
                    name: spec.availability_set.clone(),
                },
            ),
            (
                FINALIZER_RESOURCE_GROUP,
                ResourceId::ResourceGroup {
                    name: spec.resource_group.clone(),
                },
            ),
        ];

        for (finalizer, id) in steps {
            if !FinalizerSet::of(&cluster).has(finalizer) {
                continue;
            }

            match arm.delete(&id).await {
                Ok(Deletion::Done) => info!("Deleted Azure {}", id),
                Ok(Deletion::InProgress) => {
                    info!("Deletion of Azure {} still in progress", id);
                    return Ok(cluster);
                }
                Err(e) if e.is_not_found() => debug!("Azure {} is already gone", id),
                Err(e) => return Err(e.into()),
            }

            cluster = updater
                .update(&cluster_name, &|c: &mut Cluster| {
                    let mut finalizers = FinalizerSet::of(c);
                    if finalizers.remove(finalizer) {
                        c.metadata.finalizers = Some(finalizers.into_vec());
                    }
                })
                .await?;
        }

        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::arm::testing::{FakeArm, FakeArmConnector};
    use super::*;
    use crate::kubernetes::SeedSecretKeyGetter;
    use crate::provider::testing::RecordingUpdater;
    use crate::test_utils::{make_cluster, make_deleting, FakeApiServer};
    use std::sync::Mutex;

    fn make_azure_cluster(azure: AzureCloudSpec) -> Cluster {
        let mut cluster = make_cluster("abc");
        cluster.spec.cloud.datacenter_name = "azure-westeurope".to_string();
        cluster.spec.cloud.bringyourown = None;
        cluster.spec.cloud.azure = Some(AzureCloudSpec {
            tenant_id: "tenant".to_string(),
            subscription_id: "sub".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..azure
        });
        cluster
    }

    struct Fixture {
        provider: AzureProvider,
        arm: Arc<FakeArm>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn setup() -> Fixture {
        let log = Arc::new(Mutex::new(Vec::new()));
        let arm = FakeArm::new(log.clone());
        let provider = AzureProvider::new(
            DatacenterSpecAzure {
                location: "westeurope".to_string(),
            },
            Arc::new(SeedSecretKeyGetter::new(FakeApiServer::new().client())),
            Arc::new(FakeArmConnector(arm.clone())),
        );
        Fixture { provider, arm, log }
    }

    fn position(log: &[String], pred: impl Fn(&str) -> bool) -> usize {
        log.iter()
            .position(|l| pred(l))
            .unwrap_or_else(|| panic!("no matching entry in {:?}", log))
    }

    #[tokio::test]
    async fn test_default_sets_load_balancer_sku() {
        let fx = setup();
        let mut spec = make_azure_cluster(Default::default()).spec.cloud;
        fx.provider.default_cloud_spec(&mut spec).unwrap();
        assert_eq!(spec.azure.as_ref().unwrap().load_balancer_sku, "basic");

        spec.azure.as_mut().unwrap().load_balancer_sku = "standard".to_string();
        fx.provider.default_cloud_spec(&mut spec).unwrap();
        assert_eq!(spec.azure.unwrap().load_balancer_sku, "standard");
    }

    #[tokio::test]
    async fn test_cloud_config_without_secrets() {
        let fx = setup();
        let spec = make_azure_cluster(AzureCloudSpec {
            resource_group: "rg".to_string(),
            vnet_name: "vnet".to_string(),
            ..Default::default()
        })
        .spec
        .cloud;

        let config: Value = serde_json::from_str(&fx.provider.cloud_config(&spec).unwrap()).unwrap();
        assert_eq!(config["location"], "westeurope");
        assert_eq!(config["vnetResourceGroup"], "rg");
        assert_eq!(config["vnetName"], "vnet");
        assert!(config.get("aadClientSecret").is_none());
        assert!(!config.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_immutable_fields() {
        let fx = setup();
        let old = make_azure_cluster(AzureCloudSpec {
            resource_group: "rg-1".to_string(),
            ..Default::default()
        })
        .spec
        .cloud;

        let mut new = old.clone();
        new.azure.as_mut().unwrap().resource_group = "rg-2".to_string();
        let err = fx.provider.validate_cloud_spec_update(&old, &new).unwrap_err();
        assert_eq!(
            err.to_string(),
            "updating Azure resource group is not supported (was rg-1, updated to rg-2)"
        );
        assert!(err.is_permanent());

        // Filling in an empty field is how the provider records what it created
        let mut new = old.clone();
        new.azure.as_mut().unwrap().security_group = "kubernetes-abc".to_string();
        assert!(fx.provider.validate_cloud_spec_update(&old, &new).is_ok());
    }

    #[tokio::test]
    async fn test_initialize_creates_everything_in_order() {
        let fx = setup();
        let updater = RecordingUpdater::new(make_azure_cluster(Default::default()), fx.log.clone());

        let cluster = fx
            .provider
            .initialize_cloud_provider(updater.current(), &updater)
            .await
            .unwrap();

        let azure = cluster.spec.cloud.azure.clone().unwrap();
        assert_eq!(azure.resource_group, "kubernetes-abc");
        assert_eq!(azure.vnet_name, "kubernetes-abc");
        assert_eq!(azure.subnet_name, "kubernetes-abc");
        assert_eq!(azure.route_table_name, "kubernetes-abc");
        assert_eq!(azure.security_group, "kubernetes-abc");
        assert_eq!(azure.availability_set, "kubernetes-abc");

        let finalizers = FinalizerSet::of(&cluster);
        for finalizer in [
            FINALIZER_RESOURCE_GROUP,
            FINALIZER_VNET,
            FINALIZER_SUBNET,
            FINALIZER_ROUTE_TABLE,
            FINALIZER_SECURITY_GROUP,
            FINALIZER_AVAILABILITY_SET,
        ] {
            assert!(finalizers.has(finalizer), "missing {}", finalizer);
        }

        let log = fx.log.lock().unwrap().clone();
        let puts: Vec<&String> = log.iter().filter(|l| l.starts_with("PUT")).collect();
        assert_eq!(
            puts,
            vec![
                "PUT resourceGroups/kubernetes-abc",
                "PUT virtualNetworks/kubernetes-abc",
                "PUT subnets/kubernetes-abc/kubernetes-abc",
                "PUT routeTables/kubernetes-abc",
                "PUT networkSecurityGroups/kubernetes-abc",
                "PUT availabilitySets/kubernetes-abc",
            ]
        );

        let set = fx
            .arm
            .stored(&ResourceId::AvailabilitySet {
                resource_group: "kubernetes-abc".to_string(),
                name: "kubernetes-abc".to_string(),
            })
            .unwrap();
        assert_eq!(set["properties"]["platformFaultDomainCount"], 3);
    }

    #[tokio::test]
    async fn test_reconcile_persists_vnet_before_subnet() {
        let fx = setup();
        let updater = RecordingUpdater::new(
            make_azure_cluster(AzureCloudSpec {
                resource_group: "my-rg".to_string(),
                ..Default::default()
            }),
            fx.log.clone(),
        );

        let cluster = fx
            .provider
            .reconcile_cluster(updater.current(), &updater)
            .await
            .unwrap();
        assert_eq!(cluster.spec.cloud.azure.as_ref().unwrap().resource_group, "my-rg");

        let log = fx.log.lock().unwrap().clone();
        assert!(!log.iter().any(|l| l.contains("resourceGroups/")));
        let vnet_persisted = position(&log, |l| l.starts_with("update") && l.contains("vnet=kubernetes-abc"));
        let subnet_created = position(&log, |l| l == "PUT subnets/kubernetes-abc/kubernetes-abc");
        assert!(vnet_persisted < subnet_created);
        assert!(!FinalizerSet::of(&updater.current()).has(FINALIZER_RESOURCE_GROUP));
    }

    #[tokio::test]
    async fn test_reconcile_settled_cluster_touches_nothing() {
        let fx = setup();
        let updater = RecordingUpdater::new(make_azure_cluster(Default::default()), fx.log.clone());
        let cluster = fx
            .provider
            .initialize_cloud_provider(updater.current(), &updater)
            .await
            .unwrap();
        let updates = updater.updates();
        let puts = fx.arm.calls("PUT");

        fx.provider.reconcile_cluster(cluster, &updater).await.unwrap();
        assert_eq!(updater.updates(), updates);
        assert_eq!(fx.arm.calls("PUT"), puts);
    }

    #[tokio::test]
    async fn test_foreign_vnet_is_used_but_not_owned() {
        let fx = setup();
        let vnet = ResourceId::VirtualNetwork {
            resource_group: "network-rg".to_string(),
            name: "shared".to_string(),
        };
        fx.arm.insert(&vnet, json!({ "tags": { "team": "network" } }));
        let existing_subnet = ResourceId::Subnet {
            resource_group: "network-rg".to_string(),
            vnet: "shared".to_string(),
            name: "kubernetes-abc".to_string(),
        };
        fx.arm.insert(&existing_subnet, json!({ "properties": {} }));

        let updater = RecordingUpdater::new(
            make_azure_cluster(AzureCloudSpec {
                resource_group: "my-rg".to_string(),
                vnet_resource_group: "network-rg".to_string(),
                vnet_name: "shared".to_string(),
                ..Default::default()
            }),
            fx.log.clone(),
        );

        let cluster = fx
            .provider
            .reconcile_cluster(updater.current(), &updater)
            .await
            .unwrap();

        assert_eq!(cluster.spec.cloud.azure.as_ref().unwrap().subnet_name, "kubernetes-abc");
        let finalizers = FinalizerSet::of(&cluster);
        assert!(!finalizers.has(FINALIZER_SUBNET));
        assert!(!finalizers.has(FINALIZER_VNET));
        assert!(finalizers.has(FINALIZER_SECURITY_GROUP));
        let log = fx.log.lock().unwrap().clone();
        assert!(!log.iter().any(|l| l.starts_with("PUT subnets/")));
    }

    #[tokio::test]
    async fn test_icmp_rules_added_in_one_update_and_only_once() {
        let fx = setup();
        let cluster = make_azure_cluster(AzureCloudSpec {
            resource_group: "rg".to_string(),
            security_group: "kubernetes-abc".to_string(),
            ..Default::default()
        });
        let id = ResourceId::SecurityGroup {
            resource_group: "rg".to_string(),
            name: "kubernetes-abc".to_string(),
        };
        fx.arm.insert(
            &id,
            json!({
                "tags": { "cluster": "abc" },
                "properties": { "securityRules": [
                    security_rule(DENY_ALL_TCP_RULE, 800, "Inbound", "Deny", "Tcp", "*", "*"),
                    security_rule("custom", 150, "Inbound", "Allow", "Tcp", "*", "443"),
                ]},
            }),
        );

        fx.provider.add_icmp_rules_if_required(&cluster).await.unwrap();
        assert_eq!(fx.arm.calls("PUT"), 1);
        let rules = fx.arm.stored(&id).unwrap()["properties"]["securityRules"].clone();
        let names: Vec<&str> = rules
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![DENY_ALL_TCP_RULE, "custom", DENY_ALL_UDP_RULE, ALLOW_ALL_ICMP_RULE]);

        fx.provider.add_icmp_rules_if_required(&cluster).await.unwrap();
        assert_eq!(fx.arm.calls("PUT"), 1);
    }

    #[tokio::test]
    async fn test_icmp_rules_leave_foreign_group_alone() {
        let fx = setup();
        let cluster = make_azure_cluster(AzureCloudSpec {
            resource_group: "rg".to_string(),
            security_group: "corp-nsg".to_string(),
            ..Default::default()
        });
        fx.arm.insert(
            &ResourceId::SecurityGroup {
                resource_group: "rg".to_string(),
                name: "corp-nsg".to_string(),
            },
            json!({ "properties": { "securityRules": [] } }),
        );

        fx.provider.add_icmp_rules_if_required(&cluster).await.unwrap();
        assert_eq!(fx.arm.calls("PUT"), 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_resources() {
        let fx = setup();
        let updater = RecordingUpdater::new(make_azure_cluster(Default::default()), fx.log.clone());
        let cluster = fx
            .provider
            .initialize_cloud_provider(updater.current(), &updater)
            .await
            .unwrap();

        // Security group vanished out of band
        fx.arm
            .resources
            .lock()
            .unwrap()
            .retain(|path, _| !path.contains("networkSecurityGroups"));

        let cluster = make_deleting(cluster.clone(), &FinalizerSet::of(&cluster).iter().collect::<Vec<_>>());
        *updater.cluster.lock().unwrap() = cluster.clone();
        let cluster = fx
            .provider
            .clean_up_cloud_provider(cluster, &updater)
            .await
            .unwrap();

        assert!(FinalizerSet::of(&cluster).is_empty());
        assert!(fx.arm.resources.lock().unwrap().is_empty());

        let log = fx.log.lock().unwrap().clone();
        let deletes: Vec<&String> = log.iter().filter(|l| l.starts_with("DELETE")).collect();
        assert_eq!(
            deletes,
            vec![
                "DELETE networkSecurityGroups/kubernetes-abc",
                "DELETE routeTables/kubernetes-abc",
                "DELETE subnets/kubernetes-abc/kubernetes-abc",
                "DELETE virtualNetworks/kubernetes-abc",
                "DELETE availabilitySets/kubernetes-abc",
                "DELETE resourceGroups/kubernetes-abc",
            ]
        );
    }

    #[tokio::test]
    async fn test_cleanup_stops_on_provider_error() {
        let fx = setup();
        let updater = RecordingUpdater::new(make_azure_cluster(Default::default()), fx.log.clone());
        let cluster = fx
            .provider
            .initialize_cloud_provider(updater.current(), &updater)
            .await
            .unwrap();
        fx.arm.fail(
            "DELETE",
            &ResourceId::Subnet {
                resource_group: "kubernetes-abc".to_string(),
                vnet: "kubernetes-abc".to_string(),
                name: "kubernetes-abc".to_string(),
            },
            500,
        );

        assert!(fx
            .provider
            .clean_up_cloud_provider(cluster, &updater)
            .await
            .is_err());

        let finalizers = FinalizerSet::of(&updater.current());
        assert!(!finalizers.has(FINALIZER_SECURITY_GROUP));
        assert!(!finalizers.has(FINALIZER_ROUTE_TABLE));
        assert!(finalizers.has(FINALIZER_SUBNET));
        assert!(finalizers.has(FINALIZER_VNET));
        assert!(finalizers.has(FINALIZER_RESOURCE_GROUP));
    }

    #[tokio::test]
    async fn test_validate_reports_missing_resource() {
        let fx = setup();
        let spec = make_azure_cluster(AzureCloudSpec {
            resource_group: "rg".to_string(),
            ..Default::default()
        })
        .spec
        .cloud;
        let err = fx.provider.validate_cloud_spec(&spec).await.unwrap_err();
        assert!(err.to_string().contains("failed to get resource group"));

        fx.arm.insert(
            &ResourceId::ResourceGroup {
                name: "rg".to_string(),
            },
            json!({}),
        );
        fx.provider.validate_cloud_spec(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_credentials_required() {
        let fx = setup();
        let mut spec = make_azure_cluster(Default::default()).spec.cloud;
        spec.azure.as_mut().unwrap().client_secret.clear();
        assert!(matches!(
            fx.provider.validate_cloud_spec(&spec).await,
            Err(SeedkeeperError::Credentials(_))
        ));
    }

    #[test]
    fn test_fault_domains() {
        assert_eq!(fault_domain_count("westeurope").unwrap(), 3);
        assert_eq!(fault_domain_count("westus2").unwrap(), 2);
        assert!(fault_domain_count("moon").is_err());
    }
}
