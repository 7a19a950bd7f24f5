//! Process supervision inside the workload containers.
//!
//! Every workload container runs Pebble. The charms declare one layer per service and start it,
//! and push the scripts and configuration files the entrypoints expect. [Workload] is the seam
//! the charms talk to; [Pebble] implements it over the sockets Juju mounts into the charm
//! container.

pub mod client;
pub mod layer;

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::is_charm_file;
use crate::config::socket_path;
use crate::error::Result;
use crate::pebble::client::PebbleClient;
use crate::pebble::layer::Layer;
use crate::pebble::layer::Service;

/// Pebble operations on named workload containers.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn add_layer(&self, container: &str, label: &str, layer: &Layer, combine: bool) -> Result<()>;

    async fn is_running(&self, container: &str, service: &str) -> Result<bool>;

    async fn start(&self, container: &str, services: &[String]) -> Result<()>;

    /// Starts every service of the container with `startup: enabled`.
    async fn autostart(&self, container: &str) -> Result<()>;

    async fn push(&self, container: &str, path: &str, data: Vec<u8>, permissions: u32) -> Result<()>;
}

/// [Workload] reaching Pebble through `<containers_dir>/<container>/pebble.socket`.
#[derive(Debug, Clone)]
pub struct Pebble {
    containers_dir: PathBuf,
}

impl Pebble {
    pub fn new(containers_dir: impl Into<PathBuf>) -> Self {
        Pebble {
            containers_dir: containers_dir.into(),
        }
    }

    fn client(&self, container: &str) -> PebbleClient {
        PebbleClient::new(container, socket_path(&self.containers_dir, container))
    }
}

#[async_trait]
impl Workload for Pebble {
    async fn add_layer(&self, container: &str, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        self.client(container).add_layer(label, &layer.to_yaml()?, combine).await
    }

    async fn is_running(&self, container: &str, service: &str) -> Result<bool> {
        self.client(container).is_running(service).await
    }

    async fn start(&self, container: &str, services: &[String]) -> Result<()> {
        self.client(container).service_action("start", services).await
    }

    async fn autostart(&self, container: &str) -> Result<()> {
        self.client(container).service_action("autostart", &[]).await
    }

    async fn push(&self, container: &str, path: &str, data: Vec<u8>, permissions: u32) -> Result<()> {
        self.client(container).push(path, data, permissions).await
    }
}

/// Declares a layer labelled `name` holding the single service `name` and starts the service
/// unless Pebble already reports it running.
pub async fn ensure_service<W: Workload + ?Sized>(
    workload: &W,
    container: &str,
    name: &str,
    service: Service,
) -> Result<()> {
    let layer = Layer::new(
        format!("{name} layer"),
        format!("pebble config layer for {name}"),
    )
    .service(name, service);
    workload.add_layer(container, name, &layer, true).await?;

    if workload.is_running(container, name).await? {
        log::debug!(container = container, service = name; "Service already running");
        return Ok(());
    }
    workload.start(container, &[name.to_owned()]).await?;
    log::info!(container = container, service = name; "Service started");
    Ok(())
}

/// Pushes every charm file of `src` whose extension is in `extensions` (all files when empty)
/// to `<dst>/<file name>`. Returns the pushed destination paths, sorted.
pub async fn push_dir<W: Workload + ?Sized>(
    workload: &W,
    container: &str,
    src: &Path,
    dst: &str,
    extensions: &[&str],
    permissions: u32,
) -> Result<Vec<String>> {
    let mut pushed = Vec::new();
    for (file_name, path) in read_dir_sorted(src).await? {
        let matches = extensions.is_empty()
            || path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext));
        if !matches {
            continue;
        }

        let target = format!("{}/{file_name}", dst.trim_end_matches('/'));
        let data = tokio::fs::read(&path).await?;
        workload.push(container, &target, data, permissions).await?;
        pushed.push(target);
    }

    log::info!(container = container, destination = dst, count = pushed.len(); "Pushed files");
    Ok(pushed)
}

/// Pushes the single file `src` to `<dst>/<file name>`.
pub async fn push_file<W: Workload + ?Sized>(
    workload: &W,
    container: &str,
    src: &Path,
    dst: &str,
    permissions: u32,
) -> Result<String> {
    let file_name = src
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = format!("{}/{file_name}", dst.trim_end_matches('/'));
    let data = tokio::fs::read(src).await?;
    workload.push(container, &target, data, permissions).await?;
    Ok(target)
}

/// The charm files of `dir` as (file name, path), sorted by name.
pub(crate) async fn read_dir_sorted(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_file() && is_charm_file(&file_name) {
            files.push((file_name, entry.path()));
        }
    }
    files.sort();
    Ok(files)
}
