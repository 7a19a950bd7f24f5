//! Charm configuration (`config-get`) and the process environment Juju provides to every hook.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const CONTAINERS_DIR: &str = "/charm/containers";
const STATE_FILE: &str = ".unit-state.json";

/// The charm options set by the operator with `juju config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmConfig {
    #[serde(default)]
    pub thing: Option<String>,
    #[serde(default, rename = "s6aPort")]
    pub s6a_port: Option<u16>,
    #[serde(default, rename = "promExporterPort")]
    pub prom_exporter_port: Option<u16>,
}

/// Where the charm runs: application, namespace and the directories Juju mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharmEnv {
    pub app_name: String,
    pub unit_name: String,
    pub namespace: String,
    pub charm_dir: PathBuf,
    /// Parent directory of the per-container Pebble sockets.
    pub containers_dir: PathBuf,
}

impl CharmEnv {
    /// Reads `JUJU_UNIT_NAME` and `JUJU_CHARM_DIR`. The namespace comes from the mounted
    /// service account and falls back to `JUJU_MODEL_NAME`, which Juju uses as namespace name.
    pub fn from_env() -> Result<Self> {
        let unit_name = required_var("JUJU_UNIT_NAME")?;
        let charm_dir = PathBuf::from(required_var("JUJU_CHARM_DIR")?);
        let namespace = match std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE) {
            Ok(namespace) => namespace.trim().to_owned(),
            Err(e) => {
                log::debug!("Service account namespace not readable ({e}), using JUJU_MODEL_NAME");
                required_var("JUJU_MODEL_NAME")?
            }
        };

        Ok(CharmEnv {
            app_name: app_name(&unit_name)?.to_owned(),
            unit_name,
            namespace,
            charm_dir,
            containers_dir: PathBuf::from(CONTAINERS_DIR),
        })
    }

    /// Static files shipped with the charm, pushed into containers or embedded in ConfigMaps.
    pub fn files_dir(&self) -> PathBuf {
        self.charm_dir.join("src").join("files")
    }

    pub fn state_path(&self) -> PathBuf {
        self.charm_dir.join(STATE_FILE)
    }

    /// The Pebble socket of a workload container.
    pub fn pebble_socket(&self, container: &str) -> PathBuf {
        socket_path(&self.containers_dir, container)
    }
}

pub(crate) fn socket_path(containers_dir: &Path, container: &str) -> PathBuf {
    containers_dir.join(container).join("pebble.socket")
}

/// Extracts the application from a unit name such as `mme/0`.
pub fn app_name(unit_name: &str) -> Result<&str> {
    match unit_name.split_once('/') {
        Some((app, number)) if !app.is_empty() && number.parse::<u32>().is_ok() => Ok(app),
        _ => Err(Error::UserInput(format!("Invalid unit name '{unit_name}'"))),
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::UserInput(format!("Environment variable {name} is not set")))
}

/// Whether a file of the charm's `src/files` tree is shipped, i.e. matches `*.*`. Hidden files
/// and names without an extension are skipped.
pub(crate) fn is_charm_file(name: &str) -> bool {
    !name.starts_with('.') && name.contains('.')
}
