//! In-memory fakes of the cluster, the unit and Pebble, shared by the unit tests.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::apps::v1::StatefulSetSpec;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::VolumeMount;
use kube::api::ObjectMeta;
use serde_json::Value;

use crate::config::CharmConfig;
use crate::config::CharmEnv;
use crate::error::Error;
use crate::error::Result;
use crate::k8s::ManagedObject;
use crate::k8s::ObjectRepository;
use crate::model::Model;
use crate::pebble::layer::Layer;
use crate::pebble::Workload;
use crate::state::StoredState;
use crate::unit::Unit;
use crate::unit::UnitStatus;
use crate::TryResource;

pub const NAMESPACE: &str = "ns1";

/// Builds the error the API server returns for `code`.
pub fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_owned(),
        message: format!("simulated {reason}"),
        reason: reason.to_owned(),
        code,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verb {
    List,
    Get,
    Create,
    Patch,
    Delete,
    ListClusterRoles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
}

type Key = (String, String, String);

/// List fields the API server merges element-wise in a strategic merge patch, with their
/// merge key. Every other list is replaced.
const MERGE_KEYS: [(&str, &str); 6] = [
    ("ports", "port"),
    ("containers", "name"),
    ("initContainers", "name"),
    ("volumes", "name"),
    ("volumeMounts", "mountPath"),
    ("env", "name"),
];

const FIRST_NODE_PORT: i64 = 30000;

/// A namespaced object store keyed by kind, namespace and name that records every call.
///
/// Patches are strategic merges and are rejected with 409 when they carry a stale
/// `resourceVersion`. Creating a NodePort Service allocates the node ports left open.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<Key, Value>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<BTreeMap<(Verb, String), u16>>,
    concurrent_writer: Mutex<bool>,
}

impl FakeCluster {
    fn key<K: ManagedObject>(namespace: &str, name: &str) -> Key {
        (K::kind(&()).into_owned(), namespace.to_owned(), name.to_owned())
    }

    pub fn insert<K: ManagedObject>(&self, object: K) {
        let key = Self::key::<K>(&object.try_namespace().unwrap(), object.try_name().unwrap());
        self.objects
            .lock()
            .unwrap()
            .insert(key, serde_json::to_value(&object).unwrap());
    }

    pub fn object<K: ManagedObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key::<K>(namespace, name))
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    /// Names of all objects of kind `K` in `namespace`, sorted.
    pub fn names<K: ManagedObject>(&self, namespace: &str) -> Vec<String> {
        let kind = K::kind(&());
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Snapshot of everything stored except Events, without resource versions.
    pub fn snapshot(&self) -> BTreeMap<Key, Value> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((kind, _, _), _)| kind != "Event")
            .map(|(key, value)| {
                let mut value = value.clone();
                if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.remove("resourceVersion");
                }
                (key.clone(), value)
            })
            .collect()
    }

    /// Makes another writer change every object right after it was read.
    pub fn write_after_every_get(&self) {
        *self.concurrent_writer.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls with `verb`, ignoring the Events the recorder creates.
    pub fn calls_with(&self, verb: Verb) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.verb == verb && call.kind != "Event")
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Makes every `verb` on `kind` fail with `code`.
    pub fn fail(&self, verb: Verb, kind: &str, code: u16) {
        self.failures.lock().unwrap().insert((verb, kind.to_owned()), code);
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    fn record(&self, verb: Verb, kind: &str, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call {
            verb,
            kind: kind.to_owned(),
            name: name.to_owned(),
        });
        match self.failures.lock().unwrap().get(&(verb, kind.to_owned())) {
            Some(code) => Err(api_error(*code, "Simulated")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectRepository for FakeCluster {
    async fn list_named<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<Vec<K>> {
        self.record(Verb::List, &K::kind(&()), name)?;
        Ok(self.object::<K>(namespace, name).into_iter().collect())
    }

    async fn get<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<K> {
        self.record(Verb::Get, &K::kind(&()), name)?;
        let read = self.object::<K>(namespace, name).ok_or_else(|| api_error(404, "NotFound"))?;
        if *self.concurrent_writer.lock().unwrap() {
            if let Some(stored) = self.objects.lock().unwrap().get_mut(&Self::key::<K>(namespace, name)) {
                bump_resource_version(stored);
            }
        }
        Ok(read)
    }

    async fn create<K: ManagedObject>(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object.try_name()?;
        self.record(Verb::Create, &K::kind(&()), name)?;
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key::<K>(namespace, name);
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut created = serde_json::to_value(object)?;
        allocate_node_ports(&mut created);
        bump_resource_version(&mut created);
        objects.insert(key, created.clone());
        Ok(serde_json::from_value(created)?)
    }

    async fn patch<K: ManagedObject>(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        self.record(Verb::Patch, &K::kind(&()), name)?;
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&Self::key::<K>(namespace, name)) else {
            return Err(api_error(404, "NotFound"));
        };

        let patch = serde_json::to_value(object)?;
        let expected = patch.pointer("/metadata/resourceVersion");
        if expected.is_some() && expected != stored.pointer("/metadata/resourceVersion") {
            return Err(api_error(409, "Conflict"));
        }
        strategic_merge(stored, &patch);
        bump_resource_version(stored);
        Ok(serde_json::from_value(stored.clone())?)
    }

    async fn delete<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Verb::Delete, &K::kind(&()), name)?;
        match self.objects.lock().unwrap().remove(&Self::key::<K>(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound")),
        }
    }

    async fn list_cluster_roles(&self) -> Result<()> {
        self.record(Verb::ListClusterRoles, "ClusterRole", "")
    }
}

fn strategic_merge(target: &mut Value, patch: &Value) {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return;
    };

    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
            continue;
        }
        let merge_key = MERGE_KEYS.iter().find(|(field, _)| *field == key.as_str()).map(|(_, merge_key)| *merge_key);
        let merged = match (target.remove(key), merge_key) {
            (Some(Value::Array(mut items)), Some(merge_key)) if value.is_array() => {
                merge_list(&mut items, value, merge_key);
                Value::Array(items)
            }
            (Some(mut existing @ Value::Object(_)), _) if value.is_object() => {
                strategic_merge(&mut existing, value);
                existing
            }
            _ => value.clone(),
        };
        target.insert(key.clone(), merged);
    }
}

fn merge_list(items: &mut Vec<Value>, patch: &Value, merge_key: &str) {
    for item in patch.as_array().into_iter().flatten() {
        let key = item.get(merge_key);
        match items.iter_mut().find(|current| key.is_some() && current.get(merge_key) == key) {
            Some(current) => strategic_merge(current, item),
            None => items.push(item.clone()),
        }
    }
}

fn bump_resource_version(object: &mut Value) {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    let current = metadata
        .get("resourceVersion")
        .and_then(Value::as_str)
        .and_then(|version| version.parse::<u64>().ok())
        .unwrap_or_default();
    metadata.insert("resourceVersion".to_owned(), Value::String((current + 1).to_string()));
}

fn allocate_node_ports(object: &mut Value) {
    let Some(spec) = object.get_mut("spec").and_then(Value::as_object_mut) else {
        return;
    };
    if spec.get("type").and_then(Value::as_str) != Some("NodePort") {
        return;
    }
    let ports = spec.get_mut("ports").and_then(Value::as_array_mut).into_iter().flatten();
    for (offset, port) in (0..).zip(ports) {
        if let Some(port) = port.as_object_mut() {
            port.entry("nodePort").or_insert(Value::from(FIRST_NODE_PORT + offset));
        }
    }
}

/// A unit whose hook tool calls are recorded.
pub struct FakeUnit {
    statuses: Mutex<Vec<UnitStatus>>,
    config: Mutex<CharmConfig>,
    action_params: Mutex<Value>,
    action_results: Mutex<BTreeMap<String, String>>,
    action_failures: Mutex<Vec<String>>,
    leader: Mutex<bool>,
}

impl Default for FakeUnit {
    fn default() -> Self {
        FakeUnit {
            statuses: Mutex::new(Vec::new()),
            config: Mutex::new(CharmConfig {
                thing: Some("🎁".to_owned()),
                ..Default::default()
            }),
            action_params: Mutex::new(Value::Object(Default::default())),
            action_results: Mutex::new(BTreeMap::new()),
            action_failures: Mutex::new(Vec::new()),
            leader: Mutex::new(true),
        }
    }
}

impl FakeUnit {
    pub fn statuses(&self) -> Vec<UnitStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<UnitStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn set_config(&self, config: CharmConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn set_action_params(&self, params: Value) {
        *self.action_params.lock().unwrap() = params;
    }

    pub fn set_leader(&self, leader: bool) {
        *self.leader.lock().unwrap() = leader;
    }

    pub fn action_results(&self) -> BTreeMap<String, String> {
        self.action_results.lock().unwrap().clone()
    }

    pub fn action_failures(&self) -> Vec<String> {
        self.action_failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl Unit for FakeUnit {
    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn config(&self) -> Result<CharmConfig> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn action_params(&self) -> Result<Value> {
        Ok(self.action_params.lock().unwrap().clone())
    }

    async fn set_action_results(&self, results: &BTreeMap<String, String>) -> Result<()> {
        self.action_results.lock().unwrap().extend(results.clone());
        Ok(())
    }

    async fn fail_action(&self, message: &str) -> Result<()> {
        self.action_failures.lock().unwrap().push(message.to_owned());
        Ok(())
    }

    async fn private_address(&self) -> Result<IpAddr> {
        Ok(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)))
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(*self.leader.lock().unwrap())
    }
}

/// Pebble in every container, tracking layers, running services and pushed files.
#[derive(Default)]
pub struct FakeWorkload {
    layers: Mutex<BTreeMap<(String, String), Layer>>,
    running: Mutex<BTreeSet<(String, String)>>,
    pushed: Mutex<BTreeMap<(String, String), (Vec<u8>, u32)>>,
    starts: Mutex<Vec<(String, String)>>,
    unavailable: Mutex<bool>,
}

impl FakeWorkload {
    /// Makes every Pebble socket unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn layer(&self, container: &str, label: &str) -> Option<Layer> {
        self.layers
            .lock()
            .unwrap()
            .get(&(container.to_owned(), label.to_owned()))
            .cloned()
    }

    pub fn running(&self) -> BTreeSet<(String, String)> {
        self.running.lock().unwrap().clone()
    }

    /// Every start request, in order.
    pub fn starts(&self) -> Vec<(String, String)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn mark_running(&self, container: &str, service: &str) {
        self.running
            .lock()
            .unwrap()
            .insert((container.to_owned(), service.to_owned()));
    }

    pub fn pushed(&self, container: &str, path: &str) -> Option<(Vec<u8>, u32)> {
        self.pushed
            .lock()
            .unwrap()
            .get(&(container.to_owned(), path.to_owned()))
            .cloned()
    }

    pub fn pushed_paths(&self, container: &str) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, path)| path.clone())
            .collect()
    }

    fn check(&self, container: &str) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(Error::WorkloadUnavailable {
                container: container.to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Workload for FakeWorkload {
    async fn add_layer(&self, container: &str, label: &str, layer: &Layer, _combine: bool) -> Result<()> {
        self.check(container)?;
        self.layers
            .lock()
            .unwrap()
            .insert((container.to_owned(), label.to_owned()), layer.clone());
        Ok(())
    }

    async fn is_running(&self, container: &str, service: &str) -> Result<bool> {
        self.check(container)?;
        Ok(self
            .running
            .lock()
            .unwrap()
            .contains(&(container.to_owned(), service.to_owned())))
    }

    async fn start(&self, container: &str, services: &[String]) -> Result<()> {
        self.check(container)?;
        for service in services {
            self.starts
                .lock()
                .unwrap()
                .push((container.to_owned(), service.clone()));
            self.mark_running(container, service);
        }
        Ok(())
    }

    async fn autostart(&self, container: &str) -> Result<()> {
        self.check(container)?;
        let enabled: Vec<String> = self
            .layers
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == container)
            .flat_map(|(_, layer)| layer.enabled_services())
            .collect();
        self.start(container, &enabled).await
    }

    async fn push(&self, container: &str, path: &str, data: Vec<u8>, permissions: u32) -> Result<()> {
        self.check(container)?;
        self.pushed
            .lock()
            .unwrap()
            .insert((container.to_owned(), path.to_owned()), (data, permissions));
        Ok(())
    }
}

pub fn test_env(app_name: &str, charm_dir: &Path) -> CharmEnv {
    CharmEnv {
        app_name: app_name.to_owned(),
        unit_name: format!("{app_name}/0"),
        namespace: NAMESPACE.to_owned(),
        charm_dir: charm_dir.to_path_buf(),
        containers_dir: PathBuf::from("/charm/containers"),
    }
}

/// A model for the `test` application with `charm_dir` as charm directory.
pub fn test_model(charm_dir: &Path) -> Model<FakeCluster, FakeUnit, FakeWorkload> {
    app_model("test", charm_dir)
}

pub fn app_model(app_name: &str, charm_dir: &Path) -> Model<FakeCluster, FakeUnit, FakeWorkload> {
    Model::new(
        test_env(app_name, charm_dir),
        FakeCluster::default(),
        FakeUnit::default(),
        FakeWorkload::default(),
        StoredState::default(),
    )
}

/// The StatefulSet Juju creates for a sidecar charm: the `charm` container first, followed by
/// one container per workload, each with the Pebble mounts only.
pub fn juju_statefulset(app_name: &str, workloads: &[&str]) -> StatefulSet {
    let container = |name: &str| Container {
        name: name.to_owned(),
        volume_mounts: Some(vec![VolumeMount {
            name: "charm-data".to_owned(),
            mount_path: "/charm/bin/pebble".to_owned(),
            sub_path: Some("charm/bin/pebble".to_owned()),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(app_name.to_owned()),
            namespace: Some(NAMESPACE.to_owned()),
            resource_version: Some("1".to_owned()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: std::iter::once("charm")
                        .chain(workloads.iter().copied())
                        .map(container)
                        .collect(),
                    init_containers: Some(vec![Container {
                        name: "charm-init".to_owned(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Writes `files` (name, content) into `dir`, creating it.
pub fn write_files(dir: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}
