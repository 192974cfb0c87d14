// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane objects in the cluster namespace.
//!
//! Each object is produced by a named creator that takes the live object and
//! sets the fields this controller owns. Everything else on the live object
//! is left as found.

use crate::constants::components::{
    APISERVER, CLOUD_CONFIG, CONTROLLER_MANAGER, ETCD, ETCD_LAUNCHER, SCHEDULER,
};
use crate::constants::features::{ENCRYPTION_AT_REST, ETCD_LAUNCHER as ETCD_LAUNCHER_FEATURE, EXTERNAL_CLOUD_PROVIDER};
use crate::constants::labels;
use crate::error::Result;
use crate::reconciling::{
    labels_modifier, owner_reference_modifier, reconcile_objects, NamedObjectCreator, ObjectModifier,
};
use crate::types::cluster::{Cluster, ControllerSettings, ExposeStrategy};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, Namespace,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

const APISERVER_PORT: i32 = 6443;
const ETCD_CLIENT_PORT: i32 = 2379;
const ETCD_PEER_PORT: i32 = 2380;
const ETCD_IMAGE: &str = "registry.k8s.io/etcd:3.5.15-0";
const ETCD_LAUNCHER_IMAGE: &str = "quay.io/kubermatic/etcd-launcher:v2.26.0";
const ETCD_DISK_SIZE: &str = "5Gi";
const DEFAULT_APISERVER_REPLICAS: i32 = 2;
const DEFAULT_CONTROLLER_REPLICAS: i32 = 1;
const DEFAULT_ETCD_CLUSTER_SIZE: i32 = 3;
const DEFAULT_NODE_PORT_RANGE: &str = "30000-32767";
const DEFAULT_SERVICE_CIDR: &str = "10.240.16.0/20";
const DEFAULT_POD_CIDR: &str = "172.25.0.0/16";
const KUBECONFIG_PATH: &str = "/etc/kubernetes/kubeconfig/kubeconfig";
const CLOUD_CONFIG_PATH: &str = "/etc/kubernetes/cloud";
const CLOUD_CONFIG_KEY: &str = "config";
const ENCRYPTION_CONFIG_PATH: &str = "/etc/kubernetes/encryption-configuration/config.yaml";

/// Cluster values every creator needs
#[derive(Clone)]
pub struct TemplateData {
    pub cluster_name: String,
    pub namespace: String,
    pub version: String,
    pub provider_name: String,
    pub cloud_config: String,
    pub expose_strategy: ExposeStrategy,
    pub node_port_range: String,
    pub service_cidr: String,
    pub pod_cidr: String,
    pub apiserver_replicas: i32,
    pub controller_manager: LeaderElection,
    pub scheduler: LeaderElection,
    pub etcd_cluster_size: i32,
    pub external_cloud_provider: bool,
    pub etcd_launcher: bool,
    pub encryption_at_rest: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LeaderElection {
    pub replicas: i32,
    pub lease_duration_seconds: Option<i32>,
    pub renew_deadline_seconds: Option<i32>,
    pub retry_period_seconds: Option<i32>,
}

impl TemplateData {
    pub fn new(cluster: &Cluster, provider_name: &str, cloud_config: String) -> Self {
        let spec = &cluster.spec;
        let overrides = &spec.components_override;
        let leader_election = |settings: &ControllerSettings| LeaderElection {
            replicas: settings.replicas.unwrap_or(DEFAULT_CONTROLLER_REPLICAS),
            lease_duration_seconds: settings.leader_election.lease_duration_seconds,
            renew_deadline_seconds: settings.leader_election.renew_deadline_seconds,
            retry_period_seconds: settings.leader_election.retry_period_seconds,
        };

        Self {
            cluster_name: cluster.name_any(),
            namespace: cluster.namespace_name(),
            version: cluster
                .control_plane_version()
                .unwrap_or(spec.version.as_str())
                .to_string(),
            provider_name: provider_name.to_string(),
            cloud_config,
            expose_strategy: spec.expose_strategy.unwrap_or(ExposeStrategy::NodePort),
            node_port_range: overrides
                .apiserver
                .node_port_range
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_NODE_PORT_RANGE.to_string()),
            service_cidr: Some(spec.cluster_network.services.cidr_blocks.join(","))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_CIDR.to_string()),
            pod_cidr: Some(spec.cluster_network.pods.cidr_blocks.join(","))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_POD_CIDR.to_string()),
            apiserver_replicas: overrides.apiserver.replicas.unwrap_or(DEFAULT_APISERVER_REPLICAS),
            controller_manager: leader_election(&overrides.controller_manager),
            scheduler: leader_election(&overrides.scheduler),
            etcd_cluster_size: overrides.etcd.cluster_size.unwrap_or(DEFAULT_ETCD_CLUSTER_SIZE),
            external_cloud_provider: cluster.feature_enabled(EXTERNAL_CLOUD_PROVIDER),
            etcd_launcher: cluster.feature_enabled(ETCD_LAUNCHER_FEATURE),
            encryption_at_rest: cluster.feature_enabled(ENCRYPTION_AT_REST),
        }
    }

    fn app_labels(&self, app: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::APP.to_string(), app.to_string()),
            (labels::CLUSTER.to_string(), self.cluster_name.clone()),
        ])
    }

    fn etcd_endpoints(&self) -> Vec<String> {
        (0..self.etcd_cluster_size)
            .map(|i| format!("https://etcd-{}.{}.{}.svc.cluster.local:{}", i, ETCD, self.namespace, ETCD_CLIENT_PORT))
            .collect()
    }

    fn etcd_initial_cluster(&self) -> String {
        (0..self.etcd_cluster_size)
            .map(|i| {
                format!(
                    "etcd-{i}=http://etcd-{i}.{}.{}.svc.cluster.local:{}",
                    ETCD, self.namespace, ETCD_PEER_PORT
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn leader_election_args(settings: &LeaderElection) -> Vec<String> {
    let mut args = vec!["--leader-elect=true".to_string()];
    if let Some(secs) = settings.lease_duration_seconds {
        args.push(format!("--leader-elect-lease-duration={}s", secs));
    }
    if let Some(secs) = settings.renew_deadline_seconds {
        args.push(format!("--leader-elect-renew-deadline={}s", secs));
    }
    if let Some(secs) = settings.retry_period_seconds {
        args.push(format!("--leader-elect-retry-period={}s", secs));
    }
    args
}

fn pod_template(labels: BTreeMap<String, String>, spec: PodSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

fn selector(labels: BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels),
        ..Default::default()
    }
}

pub fn namespace_creator(data: &TemplateData) -> NamedObjectCreator<Namespace> {
    let cluster_name = data.cluster_name.clone();
    NamedObjectCreator::new(data.namespace.clone(), move |mut ns: Namespace| {
        ns.labels_mut().insert(labels::CLUSTER.to_string(), cluster_name.clone());
        Ok(ns)
    })
}

pub fn service_creators(data: &TemplateData) -> Vec<NamedObjectCreator<Service>> {
    let apiserver = data.clone();
    let etcd = data.clone();
    vec![
        NamedObjectCreator::new(APISERVER, move |mut svc: Service| {
            let service_type = match apiserver.expose_strategy {
                ExposeStrategy::LoadBalancer => "LoadBalancer",
                ExposeStrategy::NodePort => "NodePort",
                ExposeStrategy::Tunneling => "ClusterIP",
            };
            let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
            // keep the allocated node port across updates
            let node_port = spec
                .ports
                .as_ref()
                .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some("secure")))
                .and_then(|p| p.node_port)
                .filter(|_| service_type != "ClusterIP");
            spec.type_ = Some(service_type.to_string());
            spec.selector = Some(apiserver.app_labels(APISERVER));
            spec.ports = Some(vec![ServicePort {
                name: Some("secure".to_string()),
                port: APISERVER_PORT,
                target_port: Some(IntOrString::Int(APISERVER_PORT)),
                protocol: Some("TCP".to_string()),
                node_port,
                ..Default::default()
            }]);
            Ok(svc)
        }),
        NamedObjectCreator::new(ETCD, move |mut svc: Service| {
            let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
            spec.cluster_ip = Some("None".to_string());
            spec.publish_not_ready_addresses = Some(true);
            spec.selector = Some(etcd.app_labels(ETCD));
            spec.ports = Some(vec![
                ServicePort {
                    name: Some("client".to_string()),
                    port: ETCD_CLIENT_PORT,
                    target_port: Some(IntOrString::Int(ETCD_CLIENT_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("peer".to_string()),
                    port: ETCD_PEER_PORT,
                    target_port: Some(IntOrString::Int(ETCD_PEER_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]);
            Ok(svc)
        }),
    ]
}

pub fn config_map_creators(data: &TemplateData) -> Vec<NamedObjectCreator<ConfigMap>> {
    let config = data.cloud_config.clone();
    vec![NamedObjectCreator::new(CLOUD_CONFIG, move |mut cm: ConfigMap| {
        cm.data = Some(BTreeMap::from([(CLOUD_CONFIG_KEY.to_string(), config.clone())]));
        Ok(cm)
    })]
}

fn apiserver_container(data: &TemplateData) -> Container {
    let etcd_servers = data.etcd_endpoints().join(",");
    let mut args = vec![
        format!("--etcd-servers={}", etcd_servers),
        format!("--secure-port={}", APISERVER_PORT),
        format!("--service-cluster-ip-range={}", data.service_cidr),
        format!("--service-node-port-range={}", data.node_port_range),
        "--allow-privileged=true".to_string(),
        "--authorization-mode=Node,RBAC".to_string(),
    ];
    if data.external_cloud_provider {
        args.push("--cloud-provider=external".to_string());
    }
    if data.encryption_at_rest {
        args.push(format!("--encryption-provider-config={}", ENCRYPTION_CONFIG_PATH));
    }

    Container {
        name: APISERVER.to_string(),
        image: Some(format!("registry.k8s.io/kube-apiserver:v{}", data.version)),
        command: Some(vec!["kube-apiserver".to_string()]),
        args: Some(args),
        ports: Some(vec![ContainerPort {
            name: Some("secure".to_string()),
            container_port: APISERVER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn controller_manager_container(data: &TemplateData) -> Container {
    let mut args = vec![
        format!("--kubeconfig={}", KUBECONFIG_PATH),
        format!("--cluster-cidr={}", data.pod_cidr),
        format!("--service-cluster-ip-range={}", data.service_cidr),
        format!("--cluster-name={}", data.cluster_name),
    ];
    args.extend(leader_election_args(&data.controller_manager));
    if data.external_cloud_provider {
        args.push("--cloud-provider=external".to_string());
    } else if !data.cloud_config.is_empty() {
        args.push(format!("--cloud-provider={}", data.provider_name));
        args.push(format!("--cloud-config={}/{}", CLOUD_CONFIG_PATH, CLOUD_CONFIG_KEY));
    }

    Container {
        name: CONTROLLER_MANAGER.to_string(),
        image: Some(format!("registry.k8s.io/kube-controller-manager:v{}", data.version)),
        command: Some(vec!["kube-controller-manager".to_string()]),
        args: Some(args),
        volume_mounts: Some(vec![VolumeMount {
            name: CLOUD_CONFIG.to_string(),
            mount_path: CLOUD_CONFIG_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn scheduler_container(data: &TemplateData) -> Container {
    let mut args = vec![format!("--kubeconfig={}", KUBECONFIG_PATH)];
    args.extend(leader_election_args(&data.scheduler));

    Container {
        name: SCHEDULER.to_string(),
        image: Some(format!("registry.k8s.io/kube-scheduler:v{}", data.version)),
        command: Some(vec!["kube-scheduler".to_string()]),
        args: Some(args),
        ..Default::default()
    }
}

fn deployment_creator(
    name: &'static str,
    replicas: i32,
    labels: BTreeMap<String, String>,
    pod_spec: PodSpec,
) -> NamedObjectCreator<Deployment> {
    NamedObjectCreator::new(name, move |mut deployment: Deployment| {
        let spec = deployment.spec.get_or_insert_with(DeploymentSpec::default);
        spec.replicas = Some(replicas);
        spec.selector = selector(labels.clone());
        spec.template = pod_template(labels.clone(), pod_spec.clone());
        Ok(deployment)
    })
}

pub fn deployment_creators(data: &TemplateData) -> Vec<NamedObjectCreator<Deployment>> {
    let controller_manager_spec = PodSpec {
        containers: vec![controller_manager_container(data)],
        volumes: Some(vec![Volume {
            name: CLOUD_CONFIG.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: CLOUD_CONFIG.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    vec![
        deployment_creator(
            APISERVER,
            data.apiserver_replicas,
            data.app_labels(APISERVER),
            PodSpec {
                containers: vec![apiserver_container(data)],
                ..Default::default()
            },
        ),
        deployment_creator(
            CONTROLLER_MANAGER,
            data.controller_manager.replicas,
            data.app_labels(CONTROLLER_MANAGER),
            controller_manager_spec,
        ),
        deployment_creator(
            SCHEDULER,
            data.scheduler.replicas,
            data.app_labels(SCHEDULER),
            PodSpec {
                containers: vec![scheduler_container(data)],
                ..Default::default()
            },
        ),
    ]
}

fn etcd_container(data: &TemplateData) -> Container {
    let (image, command) = if data.etcd_launcher {
        (
            ETCD_LAUNCHER_IMAGE.to_string(),
            vec![
                "/opt/bin/etcd-launcher".to_string(),
                format!("--namespace={}", data.namespace),
                format!("--etcd-cluster-size={}", data.etcd_cluster_size),
                "--pod-name=$(POD_NAME)".to_string(),
            ],
        )
    } else {
        (
            ETCD_IMAGE.to_string(),
            vec![
                "etcd".to_string(),
                "--name=$(POD_NAME)".to_string(),
                "--data-dir=/var/run/etcd/pod_$(POD_NAME)/".to_string(),
                format!("--initial-cluster={}", data.etcd_initial_cluster()),
                format!("--initial-cluster-token={}", data.namespace),
                "--initial-cluster-state=new".to_string(),
                format!(
                    "--advertise-client-urls=https://$(POD_NAME).{}.{}.svc.cluster.local:{}",
                    ETCD, data.namespace, ETCD_CLIENT_PORT
                ),
                format!("--listen-client-urls=https://0.0.0.0:{}", ETCD_CLIENT_PORT),
                format!("--listen-peer-urls=http://0.0.0.0:{}", ETCD_PEER_PORT),
            ],
        )
    };

    Container {
        name: ETCD.to_string(),
        image: Some(image),
        command: Some(command),
        env: Some(vec![EnvVar {
            name: "POD_NAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ports: Some(vec![
            ContainerPort {
                name: Some("client".to_string()),
                container_port: ETCD_CLIENT_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("peer".to_string()),
                container_port: ETCD_PEER_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/run/etcd".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn statefulset_creators(data: &TemplateData) -> Vec<NamedObjectCreator<StatefulSet>> {
    let data = data.clone();
    vec![NamedObjectCreator::new(ETCD, move |mut sts: StatefulSet| {
        let labels = data.app_labels(ETCD);
        let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);
        spec.replicas = Some(data.etcd_cluster_size);
        spec.service_name = ETCD.to_string();
        spec.pod_management_policy = Some("Parallel".to_string());
        spec.selector = selector(labels.clone());
        spec.template = pod_template(
            labels,
            PodSpec {
                containers: vec![etcd_container(&data)],
                service_account_name: data.etcd_launcher.then(|| ETCD_LAUNCHER.to_string()),
                ..Default::default()
            },
        );
        // volume claim templates are immutable, only set them on creation
        if spec.volume_claim_templates.is_none() {
            spec.volume_claim_templates = Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("data".to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(ETCD_DISK_SIZE.to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]);
        }
        Ok(sts)
    })]
}

pub fn pdb_creators(data: &TemplateData) -> Vec<NamedObjectCreator<PodDisruptionBudget>> {
    let labels = data.app_labels(ETCD);
    let min_available = data.etcd_cluster_size / 2 + 1;
    vec![NamedObjectCreator::new(ETCD, move |mut pdb: PodDisruptionBudget| {
        pdb.spec = Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available)),
            selector: Some(selector(labels.clone())),
            ..Default::default()
        });
        Ok(pdb)
    })]
}

pub fn network_policy_creators(data: &TemplateData) -> Vec<NamedObjectCreator<NetworkPolicy>> {
    let data = data.clone();
    vec![NamedObjectCreator::new("etcd-allow", move |mut policy: NetworkPolicy| {
        let peer = |app: &str| NetworkPolicyPeer {
            pod_selector: Some(selector(data.app_labels(app))),
            ..Default::default()
        };
        let port = |port: i32| NetworkPolicyPort {
            port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        };
        policy.spec = Some(NetworkPolicySpec {
            pod_selector: selector(data.app_labels(ETCD)),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![peer(APISERVER), peer(ETCD)]),
                ports: Some(vec![port(ETCD_CLIENT_PORT), port(ETCD_PEER_PORT)]),
            }]),
            ..Default::default()
        });
        Ok(policy)
    })]
}

pub fn service_account_creators(data: &TemplateData) -> Vec<NamedObjectCreator<ServiceAccount>> {
    if !data.etcd_launcher {
        return Vec::new();
    }
    vec![NamedObjectCreator::new(ETCD_LAUNCHER, |sa: ServiceAccount| Ok(sa))]
}

pub fn role_creators(data: &TemplateData) -> Vec<NamedObjectCreator<Role>> {
    if !data.etcd_launcher {
        return Vec::new();
    }
    vec![NamedObjectCreator::new(ETCD_LAUNCHER, |mut role: Role| {
        role.rules = Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["kubermatic.k8c.io".to_string()]),
                resources: Some(vec!["etcdrestores".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string()],
                ..Default::default()
            },
        ]);
        Ok(role)
    })]
}

pub fn role_binding_creators(data: &TemplateData) -> Vec<NamedObjectCreator<RoleBinding>> {
    if !data.etcd_launcher {
        return Vec::new();
    }
    let namespace = data.namespace.clone();
    vec![NamedObjectCreator::new(ETCD_LAUNCHER, move |mut binding: RoleBinding| {
        binding.role_ref = RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: ETCD_LAUNCHER.to_string(),
        };
        binding.subjects = Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: ETCD_LAUNCHER.to_string(),
            namespace: Some(namespace.clone()),
            ..Default::default()
        }]);
        Ok(binding)
    })]
}

/// Owner reference and cluster label applied to every child object
fn modifiers<K>(cluster: &Cluster) -> Vec<ObjectModifier<K>>
where
    K: Resource + 'static,
{
    vec![
        owner_reference_modifier(cluster.controller_owner_ref(&())),
        labels_modifier(vec![(labels::CLUSTER.to_string(), cluster.name_any())]),
    ]
}

async fn ensure<K>(client: &Client, data: &TemplateData, cluster: &Cluster, creators: Vec<NamedObjectCreator<K>>) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + Default
        + Serialize
        + DeserializeOwned
        + Debug
        + 'static,
{
    if creators.is_empty() {
        return Ok(());
    }
    let api: Api<K> = Api::namespaced(client.clone(), &data.namespace);
    reconcile_objects(&api, Some(&data.namespace), creators, &modifiers(cluster)).await
}

/// Ensure the namespace and every control plane object of `cluster`
pub async fn ensure_resources(client: &Client, cluster: &Cluster, data: &TemplateData) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    reconcile_objects(&namespaces, None, vec![namespace_creator(data)], &modifiers(cluster)).await?;

    ensure(client, data, cluster, service_account_creators(data)).await?;
    ensure(client, data, cluster, role_creators(data)).await?;
    ensure(client, data, cluster, role_binding_creators(data)).await?;
    ensure(client, data, cluster, service_creators(data)).await?;
    ensure(client, data, cluster, config_map_creators(data)).await?;
    ensure(client, data, cluster, statefulset_creators(data)).await?;
    ensure(client, data, cluster, pdb_creators(data)).await?;
    ensure(client, data, cluster, network_policy_creators(data)).await?;
    ensure(client, data, cluster, deployment_creators(data)).await
}
