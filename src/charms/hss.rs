//! The HSS charm. HSS needs no additional objects, only different ports on the Service Juju
//! creates for the application.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service as K8sService;

use crate::charms::remember_thing;
use crate::charms::single_service_layer;
use crate::charms::thing;
use crate::charms::workload_outcome;
use crate::error::Result;
use crate::events::CharmEventReason;
use crate::events::EmitEvent;
use crate::events::EventData;
use crate::k8s::ObjectRepository;
use crate::model::Model;
use crate::pebble::layer::Service;
use crate::pebble::push_dir;
use crate::pebble::Workload;
use crate::resources::hss::service_patch;
use crate::unit::Unit;
use crate::unit::UnitStatus;
use crate::Charm;
use crate::Outcome;

const CONTAINER: &str = "hss";

#[derive(Debug, Clone, Copy, Default)]
pub struct HssCharm;

impl HssCharm {
    /// Adds the HSS ports to the application Service. Failures are reported, not returned.
    async fn patch_service<C, U, W>(model: &Model<C, U, W>) -> Result<()>
    where
        C: ObjectRepository,
        U: Unit,
        W: Workload,
    {
        if !model.unit.is_leader().await? {
            log::debug!(app = model.env.app_name.as_str(); "Not the leader, leaving the Service alone");
            return Ok(());
        }

        let (namespace, app) = (model.env.namespace.as_str(), model.env.app_name.as_str());
        let patch = service_patch(app, namespace, &model.config().await?);
        match model.cluster.patch::<K8sService>(namespace, app, &patch).await {
            Ok(patched) => {
                log::info!(namespace = namespace, name = app; "Patched Service ports");
                model
                    .events
                    .emit(&patched, EventData::normal(CharmEventReason::ServicePatched, "Exposed the HSS ports"))
                    .await;
            }
            Err(e) => {
                log::error!(namespace = namespace, name = app, error:% = e; "Failed to patch Service ports");
                model
                    .events
                    .emit(&patch, EventData::warning(CharmEventReason::ServicePatchFailed, e.to_string()))
                    .await;
            }
        }
        Ok(())
    }

    async fn configure_workload<C, U, W>(model: &Model<C, U, W>) -> Result<()>
    where
        C: ObjectRepository,
        U: Unit,
        W: Workload,
    {
        let files = model.env.files_dir();
        push_dir(&model.workload, CONTAINER, &files, "/etc/hss/conf/", &["conf", "json"], 0o755).await?;
        push_dir(&model.workload, CONTAINER, &files, "/bin/", &["sh"], 0o755).await?;

        let service = Service::new(CONTAINER, "/bin/bash -xc \"/bin/Cass_Provisioning.sh\"")
            .env("thing", thing(model).await?);
        let layer = single_service_layer(CONTAINER, service);
        model.workload.add_layer(CONTAINER, CONTAINER, &layer, true).await?;
        model.workload.autostart(CONTAINER).await
    }
}

#[async_trait]
impl<C, U, W> Charm<C, U, W> for HssCharm
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    fn name(&self) -> &'static str {
        "hss"
    }

    async fn on_install(&self, model: &mut Model<C, U, W>) -> Result<Outcome> {
        Self::patch_service(model).await?;
        Ok(Outcome::Done)
    }

    async fn on_upgrade_charm(&self, model: &mut Model<C, U, W>) -> Result<Outcome> {
        Self::patch_service(model).await?;
        Ok(Outcome::Done)
    }

    async fn on_config_changed(&self, model: &mut Model<C, U, W>) -> Result<Outcome> {
        remember_thing(model).await
    }

    async fn on_workload_ready(&self, model: &mut Model<C, U, W>, container: &str) -> Result<Outcome> {
        if container != CONTAINER {
            return Ok(Outcome::Done);
        }

        let outcome = workload_outcome(Self::configure_workload(model).await)?;
        if outcome == Outcome::Done {
            model.unit.set_status(UnitStatus::active()).await?;
        }
        Ok(outcome)
    }
}
