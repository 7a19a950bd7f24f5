//! The namespaced Kubernetes objects a network function needs besides what Juju creates.
//!
//! Each network function describes its objects in a [DesiredState] implementation. The set is
//! recomputed from scratch on every [Resources::apply] and [Resources::delete] call, so a change
//! in the charm's files directory is picked up by the next hook without any cached state.

pub mod hss;
pub mod mme;
pub mod spgwc;
pub mod spgwu;

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::api::rbac::v1::Role;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::rbac::v1::RoleRef;
use k8s_openapi::api::rbac::v1::Subject;
use kube::api::ObjectMeta;

use crate::config::is_charm_file;
use crate::error::Result;
use crate::k8s::Applied;
use crate::k8s::ManagedObject;
use crate::k8s::ObjectRepository;

pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// The objects one network function needs, in the order they are applied.
#[derive(Debug, Clone, Default)]
pub struct DesiredObjects {
    pub service_accounts: Vec<ServiceAccount>,
    pub services: Vec<Service>,
    pub config_maps: Vec<ConfigMap>,
    pub roles: Vec<Role>,
    pub role_bindings: Vec<RoleBinding>,
}

impl DesiredObjects {
    pub fn len(&self) -> usize {
        self.service_accounts.len()
            + self.services.len()
            + self.config_maps.len()
            + self.roles.len()
            + self.role_bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes the desired objects of a network function.
pub trait DesiredState: Send + Sync {
    fn desired_objects(&self) -> Result<DesiredObjects>;
}

/// Counts of what a call to [Resources::apply] or [Resources::delete] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub patched: usize,
    pub deleted: usize,
    pub missing: usize,
}

/// Reconciles the [DesiredState] of a network function against the cluster.
pub struct Resources<'a, C, D: ?Sized> {
    cluster: &'a C,
    desired: &'a D,
}

impl<'a, C, D> Resources<'a, C, D>
where
    C: ObjectRepository,
    D: DesiredState + ?Sized,
{
    pub fn new(cluster: &'a C, desired: &'a D) -> Self {
        Resources { cluster, desired }
    }

    /// Creates every missing object and patches every existing one.
    ///
    /// The first failing request aborts the call, objects applied before it stay in place and
    /// are patched by the next call.
    pub async fn apply(&self) -> Result<Summary> {
        let desired = self.desired.desired_objects()?;
        let mut summary = Summary::default();

        self.apply_all(&desired.service_accounts, &mut summary).await?;
        self.apply_all(&desired.services, &mut summary).await?;
        self.apply_all(&desired.config_maps, &mut summary).await?;
        self.apply_all(&desired.roles, &mut summary).await?;
        self.apply_all(&desired.role_bindings, &mut summary).await?;

        log::info!(
            created = summary.created,
            patched = summary.patched;
            "Created additional Kubernetes resources"
        );
        Ok(summary)
    }

    /// Deletes every desired object by name, objects that do not exist are skipped.
    pub async fn delete(&self) -> Result<Summary> {
        let desired = self.desired.desired_objects()?;
        let mut summary = Summary::default();

        self.delete_all(&desired.service_accounts, &mut summary).await?;
        self.delete_all(&desired.services, &mut summary).await?;
        self.delete_all(&desired.config_maps, &mut summary).await?;
        self.delete_all(&desired.roles, &mut summary).await?;
        self.delete_all(&desired.role_bindings, &mut summary).await?;

        log::info!(
            deleted = summary.deleted,
            missing = summary.missing;
            "Deleted additional Kubernetes resources"
        );
        Ok(summary)
    }

    async fn apply_all<K: ManagedObject>(&self, objects: &[K], summary: &mut Summary) -> Result<()> {
        for object in objects {
            match self.cluster.create_or_patch(object).await? {
                Applied::Created => summary.created += 1,
                Applied::Patched => summary.patched += 1,
            }
        }
        Ok(())
    }

    async fn delete_all<K: ManagedObject>(&self, objects: &[K], summary: &mut Summary) -> Result<()> {
        for object in objects {
            if self.cluster.delete_if_exists(object).await? {
                summary.deleted += 1;
            } else {
                summary.missing += 1;
            }
        }
        Ok(())
    }
}

/// One port of a [Service].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePortSpec {
    pub name: &'static str,
    pub port: i32,
    pub protocol: &'static str,
    pub node_port: Option<i32>,
}

impl ServicePortSpec {
    pub const fn new(name: &'static str, port: i32, protocol: &'static str) -> Self {
        ServicePortSpec {
            name,
            port,
            protocol,
            node_port: None,
        }
    }

    pub const fn with_node_port(mut self, node_port: i32) -> Self {
        self.node_port = Some(node_port);
        self
    }

    fn to_port(&self) -> ServicePort {
        ServicePort {
            name: Some(self.name.to_owned()),
            port: self.port,
            protocol: Some(self.protocol.to_owned()),
            node_port: self.node_port,
            ..Default::default()
        }
    }
}

pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_NAME_LABEL.to_owned(), app.to_owned())])
}

pub fn object_meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels: Some(labels),
        ..Default::default()
    }
}

pub fn service_account(name: &str, namespace: &str, app: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(name, namespace, app_labels(app)),
        ..Default::default()
    }
}

/// A Service selecting the pods of `app`. It is a NodePort Service when `type_` says so.
pub fn service(name: &str, namespace: &str, app: &str, type_: Option<&str>, ports: &[ServicePortSpec]) -> Service {
    Service {
        metadata: object_meta(name, namespace, app_labels(app)),
        spec: Some(ServiceSpec {
            ports: Some(ports.iter().map(ServicePortSpec::to_port).collect()),
            selector: Some(app_labels(app)),
            type_: type_.map(str::to_owned),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A ConfigMap holding every regular file of `dir`, keyed by file name. A missing directory
/// yields an empty ConfigMap.
pub fn config_map_from_dir(name: &str, namespace: &str, app: &str, dir: &Path) -> Result<ConfigMap> {
    let mut labels = app_labels(app);
    labels.insert("app".to_owned(), app.to_owned());

    Ok(ConfigMap {
        metadata: object_meta(name, namespace, labels),
        data: Some(read_files(dir)?),
        ..Default::default()
    })
}

/// The role every network function gets for the objects of its namespace.
pub fn role(name: &str, namespace: &str, app: &str) -> Role {
    let strings = |values: &[&str]| values.iter().map(|value| value.to_string()).collect::<Vec<_>>();

    Role {
        metadata: object_meta(name, namespace, app_labels(app)),
        rules: Some(vec![PolicyRule {
            api_groups: Some(strings(&["", "extensions", "batch", "apps"])),
            resources: Some(strings(&[
                "statefulsets",
                "daemonsets",
                "jobs",
                "pods",
                "services",
                "endpoints",
                "configmaps",
            ])),
            verbs: strings(&["get", "update", "delete", "list", "patch"]),
            ..Default::default()
        }]),
    }
}

/// Binds the role `name` to the service account `name`.
pub fn role_binding(name: &str, namespace: &str, app: &str) -> RoleBinding {
    RoleBinding {
        metadata: object_meta(name, namespace, app_labels(app)),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_owned(),
            kind: "Role".to_owned(),
            name: name.to_owned(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_owned(),
            name: name.to_owned(),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        }]),
    }
}

/// Reads the regular files of `dir` into a map of file name to content.
fn read_files(dir: &Path) -> Result<BTreeMap<String, String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!(directory:? = dir; "Files directory missing, using no data");
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type()?.is_file() || !is_charm_file(&file_name) {
            continue;
        }
        let content = std::fs::read_to_string(entry.path())?;
        files.insert(file_name, content);
    }
    Ok(files)
}
