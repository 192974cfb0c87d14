// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server and object builders.

use crate::error::Result as SeedkeeperResult;
use crate::kubernetes::KubeconfigProvider;
use crate::provider::{CloudProvider, ProviderResolver};
use crate::types::cloud::{BringYourOwnCloudSpec, CloudSpec};
use crate::types::cluster::{
    Cluster, ClusterSpec, ClusterStatus, ClusterVersionsStatus, ExtendedClusterHealth, HealthStatus,
};
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// Identifies a stored object: (api prefix, namespace, plural, name)
type ObjectKey = (String, String, String, String);

/// A stateful fake of the Kubernetes API.
///
/// Objects are kept as JSON keyed by their REST path. Deletion honours
/// finalizers: an object with finalizers only gets a deletionTimestamp and is
/// removed once a write leaves its finalizer list empty.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    requests: Vec<(String, String)>,
    failures: Vec<(String, String, u16)>,
    resource_version: u64,
}

#[derive(Debug)]
struct ResourcePath {
    prefix: String,
    namespace: Option<String>,
    plural: String,
    name: Option<String>,
    subresource: Option<String>,
}

impl ResourcePath {
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let prefix_len = match segments.first() {
            Some(&"api") => 2,
            Some(&"apis") => 3,
            _ => return None,
        };
        if segments.len() <= prefix_len {
            return None;
        }
        let prefix = segments[..prefix_len].join("/");
        let rest = &segments[prefix_len..];
        let (namespace, rest) = if rest.len() >= 3 && rest[0] == "namespaces" {
            (Some(rest[1].to_string()), &rest[2..])
        } else {
            (None, rest)
        };

        Some(ResourcePath {
            prefix,
            namespace,
            plural: rest.first()?.to_string(),
            name: rest.get(1).map(|s| s.to_string()),
            subresource: rest.get(2).map(|s| s.to_string()),
        })
    }

    fn key(&self, name: &str) -> ObjectKey {
        (
            self.prefix.clone(),
            self.namespace.clone().unwrap_or_default(),
            self.plural.clone(),
            name.to_string(),
        )
    }

    fn api_version(&self) -> String {
        self.prefix
            .trim_start_matches("apis/")
            .trim_start_matches("api/")
            .to_string()
    }
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a kube Client backed by this server
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "https://kubernetes.default.svc")
    }

    /// Store a typed object as if it had been created through the API
    pub fn insert<K>(&self, obj: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let collection = K::url_path(&(), obj.meta().namespace.as_deref());
        let value = serde_json::to_value(obj).expect("object serializes");
        self.insert_value(&collection, value);
    }

    /// Store a raw object under a collection path such as `/api/v1/namespaces/ns/services`
    pub fn insert_value(&self, collection: &str, mut value: Value) {
        let path = ResourcePath::parse(collection).expect("valid collection path");
        let name = value["metadata"]["name"]
            .as_str()
            .expect("object has a name")
            .to_string();
        let mut state = self.state.lock().unwrap();
        let rv = state.next_resource_version();
        stamp_metadata(&mut value, &path, rv);
        state.objects.insert(path.key(&name), value);
    }

    /// Read back a typed object
    pub fn get<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let collection = K::url_path(&(), namespace);
        self.get_value(&collection, name)
            .map(|v| serde_json::from_value(v).expect("stored object deserializes"))
    }

    pub fn get_value(&self, collection: &str, name: &str) -> Option<Value> {
        let path = ResourcePath::parse(collection)?;
        self.state.lock().unwrap().objects.get(&path.key(name)).cloned()
    }

    /// Names of all stored objects in a collection
    pub fn names(&self, collection: &str) -> Vec<String> {
        let Some(path) = ResourcePath::parse(collection) else {
            return vec![];
        };
        let state = self.state.lock().unwrap();
        state
            .matching(&path)
            .map(|v| v["metadata"]["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Fail every request whose method matches and whose path contains `path`
    pub fn fail(&self, method: &str, path: &str, code: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method.to_string(), path.to_string(), code));
    }

    /// Number of requests with this method whose path contains `path`
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, p)| m == method && p.contains(path))
            .count()
    }

    /// Number of mutating requests received so far
    pub fn writes(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, _)| m != "GET")
            .count()
    }

    fn handle(&self, method: &str, path: &str, query: &str, content_type: &str, body: &[u8]) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), path.to_string()));

        if let Some((_, _, code)) = state
            .failures
            .iter()
            .find(|(m, p, _)| m == method && path.contains(p.as_str()))
        {
            let code = *code;
            return (code, status_json(code, "injected failure"));
        }

        let Some(resource) = ResourcePath::parse(path) else {
            return (404, status_json(404, "unknown path"));
        };
        let body: Value = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(v) => v,
                Err(e) => return (400, status_json(400, &e.to_string())),
            }
        };

        match (method, resource.name.as_deref()) {
            ("GET", None) => state.list(&resource, query),
            ("GET", Some(name)) => match state.objects.get(&resource.key(name)) {
                Some(obj) => (200, obj.clone()),
                None => (404, not_found(&resource, name)),
            },
            ("POST", None) => state.create(&resource, body),
            ("PUT", Some(name)) => state.replace(&resource, name, body),
            ("PATCH", Some(name)) => state.patch(&resource, name, content_type, body),
            ("DELETE", Some(name)) => state.delete(&resource, name),
            _ => (405, status_json(405, "method not allowed")),
        }
    }
}

impl State {
    fn next_resource_version(&mut self) -> u64 {
        self.resource_version += 1;
        self.resource_version
    }

    fn matching<'a>(&'a self, path: &'a ResourcePath) -> impl Iterator<Item = &'a Value> + 'a {
        self.objects
            .iter()
            .filter(move |((prefix, ns, plural, _), _)| {
                *prefix == path.prefix
                    && *plural == path.plural
                    && path.namespace.as_ref().map_or(true, |n| n == ns)
            })
            .map(|(_, v)| v)
    }

    fn list(&mut self, path: &ResourcePath, query: &str) -> (u16, Value) {
        let selector: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == "labelSelector")
            .flat_map(|(_, v)| {
                v.split(',')
                    .filter_map(|term| term.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let items: Vec<Value> = self
            .matching(path)
            .filter(|obj| {
                selector
                    .iter()
                    .all(|(k, v)| obj["metadata"]["labels"][k].as_str() == Some(v.as_str()))
            })
            .cloned()
            .collect();

        (
            200,
            json!({
                "apiVersion": path.api_version(),
                "kind": "List",
                "metadata": { "resourceVersion": self.resource_version.to_string() },
                "items": items,
            }),
        )
    }

    fn create(&mut self, path: &ResourcePath, mut obj: Value) -> (u16, Value) {
        let name = match obj["metadata"]["name"].as_str() {
            Some(name) => name.to_string(),
            None => {
                let generated = format!(
                    "{}{}",
                    obj["metadata"]["generateName"].as_str().unwrap_or("obj-"),
                    self.resource_version + 1
                );
                obj["metadata"]["name"] = json!(generated);
                generated
            }
        };
        let key = path.key(&name);
        if self.objects.contains_key(&key) {
            let mut status = status_json(409, &format!("{} \"{}\" already exists", path.plural, name));
            status["reason"] = json!("AlreadyExists");
            return (409, status);
        }

        let rv = self.next_resource_version();
        stamp_metadata(&mut obj, path, rv);
        self.objects.insert(key, obj.clone());
        (201, obj)
    }

    fn replace(&mut self, path: &ResourcePath, name: &str, mut obj: Value) -> (u16, Value) {
        let key = path.key(name);
        let Some(existing) = self.objects.get(&key).cloned() else {
            return (404, not_found(path, name));
        };

        let sent_rv = obj["metadata"]["resourceVersion"].as_str().unwrap_or_default();
        if !sent_rv.is_empty() && sent_rv != existing["metadata"]["resourceVersion"] {
            return (409, status_json(409, "the object has been modified"));
        }

        if path.subresource.as_deref() == Some("status") {
            let mut updated = existing.clone();
            updated["status"] = obj["status"].take();
            obj = updated;
        } else {
            carry_status(&mut obj, &existing);
            if !existing["metadata"]["deletionTimestamp"].is_null() {
                obj["metadata"]["deletionTimestamp"] = existing["metadata"]["deletionTimestamp"].clone();
            }
        }
        self.store(path, name, obj)
    }

    fn patch(&mut self, path: &ResourcePath, name: &str, content_type: &str, patch: Value) -> (u16, Value) {
        let key = path.key(name);
        let Some(existing) = self.objects.get(&key).cloned() else {
            return (404, not_found(path, name));
        };

        let mut patched = existing.clone();
        if content_type.starts_with("application/json-patch+json") {
            let ops: json_patch::Patch = match serde_json::from_value(patch) {
                Ok(ops) => ops,
                Err(e) => return (400, status_json(400, &e.to_string())),
            };
            if let Err(e) = json_patch::patch(&mut patched, &ops.0) {
                return (409, status_json(409, &e.to_string()));
            }
        } else {
            json_patch::merge(&mut patched, &patch);
        }

        let obj = if path.subresource.as_deref() == Some("status") {
            let mut updated = existing;
            updated["status"] = patched["status"].take();
            updated
        } else {
            carry_status(&mut patched, &existing);
            patched
        };
        self.store(path, name, obj)
    }

    fn delete(&mut self, path: &ResourcePath, name: &str) -> (u16, Value) {
        let key = path.key(name);
        let Some(mut obj) = self.objects.get(&key).cloned() else {
            return (404, not_found(path, name));
        };

        if has_finalizers(&obj) {
            if obj["metadata"]["deletionTimestamp"].is_null() {
                obj["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
                let rv = self.next_resource_version();
                obj["metadata"]["resourceVersion"] = json!(rv.to_string());
                self.objects.insert(key, obj.clone());
            }
            return (200, obj);
        }

        self.objects.remove(&key);
        (
            200,
            json!({
                "apiVersion": "v1",
                "kind": "Status",
                "metadata": {},
                "status": "Success",
                "code": 200,
            }),
        )
    }

    /// Persist an updated object, removing it once it is deleting without finalizers
    fn store(&mut self, path: &ResourcePath, name: &str, mut obj: Value) -> (u16, Value) {
        let key = path.key(name);
        let rv = self.next_resource_version();
        obj["metadata"]["resourceVersion"] = json!(rv.to_string());

        if !obj["metadata"]["deletionTimestamp"].is_null() && !has_finalizers(&obj) {
            self.objects.remove(&key);
        } else {
            self.objects.insert(key, obj.clone());
        }
        (200, obj)
    }
}

fn stamp_metadata(obj: &mut Value, path: &ResourcePath, rv: u64) {
    let meta = &mut obj["metadata"];
    if let Some(namespace) = &path.namespace {
        meta["namespace"] = json!(namespace);
    }
    meta["resourceVersion"] = json!(rv.to_string());
    if meta["uid"].is_null() {
        meta["uid"] = json!(format!("uid-{}", rv));
    }
    if meta["creationTimestamp"].is_null() {
        meta["creationTimestamp"] = json!("2026-01-01T00:00:00Z");
    }
}

/// The main resource endpoint never changes status
fn carry_status(obj: &mut Value, from: &Value) {
    match from.get("status") {
        Some(status) => obj["status"] = status.clone(),
        None => {
            if let Some(map) = obj.as_object_mut() {
                map.remove("status");
            }
        }
    }
}

fn has_finalizers(obj: &Value) -> bool {
    obj["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

fn status_json(code: u16, message: &str) -> Value {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        400 => "BadRequest",
        _ => "InternalError",
    };
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}

fn not_found(path: &ResourcePath, name: &str) -> Value {
    status_json(404, &format!("{} \"{}\" not found", path.plural, name))
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();
            let content_type = parts
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let (status, value) = server.handle(
                parts.method.as_str(),
                parts.uri.path(),
                parts.uri.query().unwrap_or_default(),
                &content_type,
                &body,
            );

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&value)?))?)
        })
    }
}

/// Resolves every cluster to the same provider, counting lookups
pub struct FakeResolver {
    provider: Arc<dyn CloudProvider>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderResolver for FakeResolver {
    async fn resolve(&self, _cluster: &Cluster) -> SeedkeeperResult<Arc<dyn CloudProvider>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.clone())
    }
}

/// Hands out clients of a fake tenant API server, counting how often one was built
#[derive(Default)]
pub struct FakeKubeconfigs {
    pub tenant: FakeApiServer,
    calls: AtomicUsize,
}

impl FakeKubeconfigs {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KubeconfigProvider for FakeKubeconfigs {
    async fn admin_kubeconfig(&self, _cluster: &Cluster) -> SeedkeeperResult<Vec<u8>> {
        Ok(b"apiVersion: v1\nkind: Config\n".to_vec())
    }

    async fn client(&self, _cluster: &Cluster) -> SeedkeeperResult<Client> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tenant.client())
    }
}

/// A settled BringYourOwn cluster with a healthy control plane
pub fn make_cluster(name: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: ClusterSpec {
            human_readable_name: String::new(),
            version: "1.30.2".to_string(),
            cloud: CloudSpec {
                datacenter_name: "byo-dc".to_string(),
                bringyourown: Some(BringYourOwnCloudSpec {}),
                ..Default::default()
            },
            cluster_network: Default::default(),
            components_override: Default::default(),
            features: BTreeMap::new(),
            expose_strategy: None,
            pause: false,
            pause_reason: String::new(),
        },
        status: Some(ClusterStatus {
            namespace_name: format!("cluster-{}", name),
            versions: ClusterVersionsStatus {
                control_plane: "1.30.2".to_string(),
                apiserver: "1.30.2".to_string(),
            },
            extended_health: ExtendedClusterHealth {
                apiserver: HealthStatus::Up,
                scheduler: HealthStatus::Up,
                controller: HealthStatus::Up,
                etcd: HealthStatus::Up,
                cloud_provider_infrastructure: HealthStatus::Up,
            },
            ..Default::default()
        }),
    }
}

/// Mark a cluster as deleting with the given finalizers
pub fn make_deleting(mut cluster: Cluster, finalizers: &[&str]) -> Cluster {
    cluster.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
        chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    ));
    *cluster.finalizers_mut() = finalizers.iter().map(|f| f.to_string()).collect();
    cluster
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
    use kube::Api;

    fn make_config_map(name: &str, finalizers: Vec<String>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                finalizers: Some(finalizers),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_paths() {
        let p = ResourcePath::parse("/api/v1/namespaces/foo").unwrap();
        assert_eq!(p.plural, "namespaces");
        assert_eq!(p.name.as_deref(), Some("foo"));
        assert!(p.namespace.is_none());

        let p = ResourcePath::parse("/apis/apps/v1/namespaces/ns/deployments/api").unwrap();
        assert_eq!(p.prefix, "apis/apps/v1");
        assert_eq!(p.namespace.as_deref(), Some("ns"));
        assert_eq!(p.name.as_deref(), Some("api"));

        let p = ResourcePath::parse("/apis/kubermatic.k8c.io/v1/clusters/abc/status").unwrap();
        assert_eq!(p.plural, "clusters");
        assert_eq!(p.subresource.as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn test_create_get_and_conflict() {
        let server = FakeApiServer::new();
        let api: Api<ConfigMap> = Api::namespaced(server.client(), "default");

        api.create(&PostParams::default(), &make_config_map("a", vec![]))
            .await
            .unwrap();
        let fetched = api.get("a").await.unwrap();
        assert!(fetched.metadata.resource_version.is_some());

        let err = api
            .create(&PostParams::default(), &make_config_map("a", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, kube::Error::Api(e) if e.code == 409));
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers() {
        let server = FakeApiServer::new();
        server.insert(&make_config_map("a", vec!["x".to_string()]));
        let api: Api<ConfigMap> = Api::namespaced(server.client(), "default");

        api.delete("a", &DeleteParams::default()).await.unwrap();
        let cm = api.get("a").await.unwrap();
        assert!(cm.metadata.deletion_timestamp.is_some());

        api.patch(
            "a",
            &PatchParams::default(),
            &Patch::Merge(json!({"metadata": {"finalizers": null}})),
        )
        .await
        .unwrap();
        assert!(api.get_opt("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let server = FakeApiServer::new();
        server.fail("GET", "/configmaps", 500);
        let api: Api<ConfigMap> = Api::namespaced(server.client(), "default");
        let err = api.get("a").await.unwrap_err();
        assert!(matches!(err, kube::Error::Api(e) if e.code == 500));
    }
}
