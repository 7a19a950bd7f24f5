//! Generic Kubernetes repository used by the reconcilers.
//!
//! All cluster access of the charms goes through the [ObjectRepository] trait, which is
//! implemented by [K8sRepository] on top of a `kube` client. The create-or-patch and
//! delete-if-present idioms are provided methods of the trait, so every implementation shares
//! the same idempotency rules.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::ClusterRole;
use k8s_openapi::NamespaceResourceScope;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::PostParams;
use kube::config::Config;
use kube::Api;
use kube::Client;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::Error;
use crate::error::Result;
use crate::TryResource;

const PROC_1_ENVIRON: &str = "/proc/1/environ";

/// A namespaced, statically typed Kubernetes object the charms manage.
pub trait ManagedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Serialize
    + DeserializeOwned
    + Clone
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + DeserializeOwned
        + Clone
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// What [ObjectRepository::create_or_patch] did with an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Patched,
}

/// CRUD access to namespaced objects plus the RBAC check of the auth gate.
#[async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Lists the objects of kind `K` called `name` (field selector `metadata.name`).
    async fn list_named<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<Vec<K>>;

    async fn get<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<K>;

    async fn create<K: ManagedObject>(&self, namespace: &str, object: &K) -> Result<K>;

    /// Strategic merge patch with `object` as patch body.
    async fn patch<K: ManagedObject>(&self, namespace: &str, name: &str, object: &K) -> Result<K>;

    async fn delete<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<()>;

    /// Cluster-scoped read that only succeeds when the charm was granted `juju trust`.
    async fn list_cluster_roles(&self) -> Result<()>;

    /// Creates `object` when no object of that kind and name exists in its namespace,
    /// patches the existing one otherwise.
    async fn create_or_patch<K: ManagedObject>(&self, object: &K) -> Result<Applied> {
        let name = object.try_name()?;
        let namespace = object.try_namespace()?;
        let kind = K::kind(&());

        if self.list_named::<K>(&namespace, name).await?.is_empty() {
            self.create(&namespace, object).await?;
            log::info!(name = name, namespace = namespace.as_str(); "{kind} created");
            Ok(Applied::Created)
        } else {
            log::info!(name = name, namespace = namespace.as_str(); "{kind} exists, patching");
            self.patch(&namespace, name, object).await?;
            Ok(Applied::Patched)
        }
    }

    /// Deletes `object` by name. Returns `false` when it did not exist.
    async fn delete_if_exists<K: ManagedObject>(&self, object: &K) -> Result<bool> {
        let name = object.try_name()?;
        let namespace = object.try_namespace()?;

        match self.delete::<K>(&namespace, name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                log::debug!(name = name, namespace = namespace.as_str(); "{} already gone", K::kind(&()));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

type ConfigLoader = dyn Fn() -> Result<Config> + Send + Sync;

/// [ObjectRepository] backed by the Kubernetes API.
///
/// The client is built on first use, so hooks that never reach the cluster run without
/// credentials.
#[derive(Clone)]
pub struct K8sRepository {
    client: Arc<OnceCell<Client>>,
    load_config: Arc<ConfigLoader>,
}

impl K8sRepository {
    /// Loads the mounted service account once the first request is made.
    pub fn in_cluster() -> Self {
        Self::with_config(in_cluster_config)
    }

    pub fn with_config(load_config: impl Fn() -> Result<Config> + Send + Sync + 'static) -> Self {
        K8sRepository {
            client: Arc::new(OnceCell::new()),
            load_config: Arc::new(load_config),
        }
    }

    async fn client(&self) -> Result<Client> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let config = (self.load_config)()?;
                log::debug!(cluster_url:% = config.cluster_url; "Connecting to the API server");
                Ok::<_, Error>(Client::try_from(config)?)
            })
            .await?;
        Ok(client.clone())
    }

    async fn api<K: ManagedObject>(&self, namespace: &str) -> Result<Api<K>> {
        Ok(Api::namespaced(self.client().await?, namespace))
    }
}

/// The service account configuration. Juju does not always pass `KUBERNETES_SERVICE_HOST`
/// and `_PORT` to hook processes, the container's init process has them.
fn in_cluster_config() -> Result<Config> {
    if let Ok(config) = Config::incluster_env() {
        return Ok(config);
    }

    let mut config = Config::incluster_dns()?;
    match std::fs::read(PROC_1_ENVIRON) {
        Ok(raw) => {
            if let Some(url) = service_url(&String::from_utf8_lossy(&raw)) {
                config.cluster_url = url
                    .parse()
                    .map_err(|e| Error::UserInput(format!("Invalid API server address '{url}': {e}")))?;
            }
        }
        Err(e) => log::debug!("{PROC_1_ENVIRON} not readable: {e}"),
    }
    Ok(config)
}

#[async_trait]
impl ObjectRepository for K8sRepository {
    async fn list_named<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<Vec<K>> {
        let params = ListParams::default().fields(&format!("metadata.name={name}"));
        Ok(self.api::<K>(namespace).await?.list(&params).await?.items)
    }

    async fn get<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<K> {
        Ok(self.api::<K>(namespace).await?.get(name).await?)
    }

    async fn create<K: ManagedObject>(&self, namespace: &str, object: &K) -> Result<K> {
        Ok(self.api::<K>(namespace).await?.create(&PostParams::default(), object).await?)
    }

    async fn patch<K: ManagedObject>(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        Ok(self
            .api::<K>(namespace)
            .await?
            .patch(name, &PatchParams::default(), &Patch::Strategic(object))
            .await?)
    }

    async fn delete<K: ManagedObject>(&self, namespace: &str, name: &str) -> Result<()> {
        self.api::<K>(namespace).await?.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_cluster_roles(&self) -> Result<()> {
        Api::<ClusterRole>::all(self.client().await?)
            .list(&ListParams::default().limit(1))
            .await?;
        Ok(())
    }
}

/// Builds the API server URL from `KUBERNETES_SERVICE_HOST`/`_PORT` in `environ` (NUL
/// separated, as in `/proc/<pid>/environ`).
fn service_url(environ: &str) -> Option<String> {
    let lookup = |key: &str| {
        environ
            .split('\0')
            .filter_map(|entry| entry.split_once('='))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_owned())
    };

    let host = lookup("KUBERNETES_SERVICE_HOST")?;
    let port = lookup("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_owned());
    if host.contains(':') {
        Some(format!("https://[{host}]:{port}"))
    } else {
        Some(format!("https://{host}:{port}"))
    }
}
