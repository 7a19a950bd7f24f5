//! Additions to the StatefulSet Juju creates for a sidecar charm.
//!
//! Juju owns the StatefulSet of the application, the charm only adds what charm metadata cannot
//! express: volumes, volume mounts on named workload containers and init containers. Every
//! addition is described by a [StatefulSetPatch] with a versioned id. The ids of the patches
//! that were written are kept in the [APPLIED_PATCHES_ANNOTATION] of the StatefulSet itself,
//! which makes the patch a one-time operation per id.
//!
//! Appending is idempotent on its own (mounts are keyed by mount path, volumes and init
//! containers by name), so a StatefulSet that already carries some of the additions is completed
//! without duplicates.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;

use crate::error::Error;
use crate::error::Result;
use crate::k8s::ObjectRepository;

pub const APPLIED_PATCHES_ANNOTATION: &str = "omec.opennetworking.org/applied-patches";

/// Volumes, mounts and init containers to add to a StatefulSet.
#[derive(Debug, Clone, PartialEq)]
pub struct StatefulSetPatch {
    /// Versioned identifier recorded once the patch is written, e.g. `mme-volumes/v1`.
    pub id: &'static str,
    /// Mount whose presence on the named container marks StatefulSets patched before the
    /// annotation existed.
    pub marker: (&'static str, VolumeMount),
    /// Mounts keyed by container name.
    pub mounts: Vec<(&'static str, Vec<VolumeMount>)>,
    pub volumes: Vec<Volume>,
    pub init_containers: Vec<Container>,
}

/// Ids recorded in the applied-patches annotation.
pub fn applied_patches(statefulset: &StatefulSet) -> Vec<String> {
    statefulset
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(APPLIED_PATCHES_ANNOTATION))
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `patch` was applied to `statefulset`, by annotation or by the legacy marker mount.
pub fn is_patched(statefulset: &StatefulSet, patch: &StatefulSetPatch) -> bool {
    if applied_patches(statefulset).iter().any(|id| id == patch.id) {
        return true;
    }

    let (container, marker) = &patch.marker;
    pod_spec(statefulset)
        .and_then(|spec| spec.containers.iter().find(|c| c.name == *container))
        .and_then(|c| c.volume_mounts.as_ref())
        .is_some_and(|mounts| {
            mounts
                .iter()
                .any(|mount| mount.name == marker.name && mount.mount_path == marker.mount_path)
        })
}

/// Adds everything `patch` describes that is not yet present and records the patch id.
///
/// Fails without touching the StatefulSet when a container named by the patch does not exist.
pub fn apply_patch(statefulset: &mut StatefulSet, patch: &StatefulSetPatch) -> Result<()> {
    let name = statefulset.metadata.name.clone().unwrap_or_default();
    let spec = statefulset
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| Error::MissingPodSpec {
            statefulset: name.clone(),
        })?;

    if let Some((missing, _)) = patch
        .mounts
        .iter()
        .find(|(container, _)| !spec.containers.iter().any(|c| c.name == *container))
    {
        return Err(Error::MissingContainer {
            statefulset: name,
            container: missing.to_string(),
        });
    }

    for (container_name, mounts) in &patch.mounts {
        let Some(container) = spec.containers.iter_mut().find(|c| c.name == *container_name) else {
            continue;
        };
        let existing = container.volume_mounts.get_or_insert_with(Vec::new);
        for mount in mounts {
            if !existing.iter().any(|m| m.mount_path == mount.mount_path) {
                existing.push(mount.clone());
            }
        }
    }

    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    for volume in &patch.volumes {
        if !volumes.iter().any(|v| v.name == volume.name) {
            volumes.push(volume.clone());
        }
    }

    let init_containers = spec.init_containers.get_or_insert_with(Vec::new);
    for init in &patch.init_containers {
        if !init_containers.iter().any(|c| c.name == init.name) {
            init_containers.push(init.clone());
        }
    }

    let mut applied = applied_patches(statefulset);
    if !applied.iter().any(|id| id == patch.id) {
        applied.push(patch.id.to_owned());
    }
    statefulset
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(APPLIED_PATCHES_ANNOTATION.to_owned(), applied.join(","));

    Ok(())
}

fn pod_spec(statefulset: &StatefulSet) -> Option<&PodSpec> {
    statefulset.spec.as_ref().and_then(|spec| spec.template.spec.as_ref())
}

/// Reads, patches and writes back the StatefulSet of one application.
pub struct StatefulSetPatcher<'a, C> {
    cluster: &'a C,
    namespace: &'a str,
    name: &'a str,
}

impl<'a, C> StatefulSetPatcher<'a, C>
where
    C: ObjectRepository,
{
    pub fn new(cluster: &'a C, namespace: &'a str, name: &'a str) -> Self {
        StatefulSetPatcher {
            cluster,
            namespace,
            name,
        }
    }

    pub async fn is_patched(&self, patch: &StatefulSetPatch) -> Result<bool> {
        let statefulset = self.cluster.get::<StatefulSet>(self.namespace, self.name).await?;
        Ok(is_patched(&statefulset, patch))
    }

    /// Applies `patch` unless it already is. Returns the written StatefulSet, `None` when
    /// nothing had to be written.
    ///
    /// The write carries the `resourceVersion` that was read, so a StatefulSet changed in
    /// between is rejected with a conflict instead of being overwritten.
    pub async fn ensure_patched(&self, patch: &StatefulSetPatch) -> Result<Option<StatefulSet>> {
        let mut statefulset = self.cluster.get::<StatefulSet>(self.namespace, self.name).await?;
        if is_patched(&statefulset, patch) {
            log::debug!(statefulset = self.name, patch = patch.id; "StatefulSet already patched");
            return Ok(None);
        }

        apply_patch(&mut statefulset, patch)?;
        statefulset.metadata.managed_fields = None;
        statefulset.status = None;

        let written = self.cluster.patch(self.namespace, self.name, &statefulset).await?;
        log::info!(
            statefulset = self.name,
            patch = patch.id;
            "Patched StatefulSet to include additional volumes and mounts"
        );
        Ok(Some(written))
    }
}
