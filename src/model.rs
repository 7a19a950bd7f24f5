//! Everything a hook handler works with, bundled per invocation.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;

use crate::auth::AuthGate;
use crate::config::CharmConfig;
use crate::config::CharmEnv;
use crate::error::Result;
use crate::events::CharmEventReason;
use crate::events::EmitEvent;
use crate::events::EventData;
use crate::events::EventRecorder;
use crate::k8s::ObjectRepository;
use crate::pebble::Workload;
use crate::resources::DesiredState;
use crate::resources::Resources;
use crate::resources::Summary;
use crate::state::StoredState;
use crate::statefulset::StatefulSetPatch;
use crate::statefulset::StatefulSetPatcher;
use crate::unit::Unit;
use crate::unit::UnitStatus;

pub const PATCHING_MESSAGE: &str = "patching StatefulSet for additional k8s permissions";
pub const WAITING_MESSAGE: &str = "waiting for changes to apply";

pub struct Model<C, U, W>
where
    C: ObjectRepository,
{
    pub env: CharmEnv,
    pub cluster: Arc<C>,
    pub unit: U,
    pub workload: W,
    pub auth: AuthGate,
    pub state: StoredState,
    pub events: EventRecorder<C>,
}

impl<C, U, W> Model<C, U, W>
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    pub fn new(env: CharmEnv, cluster: C, unit: U, workload: W, state: StoredState) -> Self {
        let cluster = Arc::new(cluster);
        let events = EventRecorder::new(cluster.clone(), format!("{}-charm", env.app_name));
        Model {
            env,
            cluster,
            unit,
            workload,
            auth: AuthGate::default(),
            state,
            events,
        }
    }

    /// See [AuthGate::check].
    pub async fn authorize(&mut self) -> Result<bool> {
        self.auth.check(self.cluster.as_ref(), &self.unit).await
    }

    pub async fn config(&self) -> Result<CharmConfig> {
        self.unit.config().await
    }

    /// The pod IP, as handed to the workloads in `POD_IP`.
    pub async fn pod_ip(&self) -> Result<String> {
        Ok(self.unit.private_address().await?.to_string())
    }

    /// Creates or patches the objects of `desired` and leaves an event on the StatefulSet.
    pub async fn apply_resources<D: DesiredState + ?Sized>(&self, desired: &D) -> Result<Summary> {
        let summary = Resources::new(self.cluster.as_ref(), desired).apply().await?;
        self.record_on_statefulset(EventData::normal(
            CharmEventReason::ResourcesApplied,
            format!("{} created, {} patched", summary.created, summary.patched),
        ))
        .await;
        Ok(summary)
    }

    pub async fn delete_resources<D: DesiredState + ?Sized>(&self, desired: &D) -> Result<Summary> {
        let summary = Resources::new(self.cluster.as_ref(), desired).delete().await?;
        self.record_on_statefulset(EventData::normal(
            CharmEventReason::ResourcesDeleted,
            format!("{} deleted, {} already gone", summary.deleted, summary.missing),
        ))
        .await;
        Ok(summary)
    }

    /// Applies `patch` to the application's StatefulSet unless it already is, reporting progress
    /// in the unit status. Returns whether the StatefulSet was written.
    pub async fn patch_statefulset(&self, patch: &StatefulSetPatch) -> Result<bool> {
        let patcher = StatefulSetPatcher::new(self.cluster.as_ref(), &self.env.namespace, &self.env.app_name);
        if patcher.is_patched(patch).await? {
            return Ok(false);
        }

        self.unit.set_status(UnitStatus::maintenance(PATCHING_MESSAGE)).await?;
        let Some(written) = patcher.ensure_patched(patch).await? else {
            return Ok(false);
        };
        self.events
            .emit(
                &written,
                EventData::normal(CharmEventReason::StatefulSetPatched, format!("Applied patch {}", patch.id)),
            )
            .await;
        self.unit.set_status(UnitStatus::maintenance(WAITING_MESSAGE)).await?;
        Ok(true)
    }

    /// Emits `event` on the application's StatefulSet when it can be read.
    pub async fn record_on_statefulset(&self, event: EventData<CharmEventReason>) {
        match self
            .cluster
            .get::<StatefulSet>(&self.env.namespace, &self.env.app_name)
            .await
        {
            Ok(statefulset) => self.events.emit(&statefulset, event).await,
            Err(e) => log::debug!(reason:% = event.reason, error:% = e; "Event not recorded"),
        }
    }
}
