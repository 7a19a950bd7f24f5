//! The SPGW-C charm.

use async_trait::async_trait;

use crate::charms::remember_thing;
use crate::charms::single_service_layer;
use crate::charms::thing;
use crate::charms::workload_outcome;
use crate::error::Result;
use crate::k8s::ObjectRepository;
use crate::model::Model;
use crate::pebble::layer::Service;
use crate::pebble::push_dir;
use crate::pebble::Workload;
use crate::resources::spgwc::SpgwcResources;
use crate::unit::Unit;
use crate::unit::UnitStatus;
use crate::Charm;
use crate::Outcome;

const CONTAINER: &str = "spgwc";

#[derive(Debug, Clone, Copy, Default)]
pub struct SpgwcCharm;

impl SpgwcCharm {
    fn resources<C, U, W>(model: &Model<C, U, W>) -> SpgwcResources
    where
        C: ObjectRepository,
    {
        SpgwcResources::new(&model.env.app_name, &model.env.namespace, model.env.files_dir())
    }

    async fn configure_workload<C, U, W>(model: &Model<C, U, W>) -> Result<()>
    where
        C: ObjectRepository,
        U: Unit,
        W: Workload,
    {
        let files = model.env.files_dir();
        push_dir(&model.workload, CONTAINER, &files.join("script"), "/opt/cp/scripts/", &[], 0o755).await?;
        push_dir(&model.workload, CONTAINER, &files.join("config"), "/etc/cp/config/", &[], 0o755).await?;

        let service = Service::new(CONTAINER, "/bin/bash -xc \"/opt/cp/scripts/spgwc-run.sh\"")
            .env("thing", thing(model).await?);
        let layer = single_service_layer(CONTAINER, service);
        model.workload.add_layer(CONTAINER, CONTAINER, &layer, true).await?;
        model.workload.autostart(CONTAINER).await
    }
}

#[async_trait]
impl<C, U, W> Charm<C, U, W> for SpgwcCharm
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    fn name(&self) -> &'static str {
        "spgwc"
    }

    async fn on_install(&self, model: &mut Model<C, U, W>) -> Result<Outcome> {
        if !model.authorize().await? {
            return Ok(Outcome::Deferred);
        }
        model
            .unit
            .set_status(UnitStatus::maintenance("creating k8s resources"))
            .await?;
        model.apply_resources(&Self::resources(model)).await?;
        Ok(Outcome::Done)
    }

    async fn on_remove(&self, model: &mut Model<C, U, W>) -> Result<Outcome> {
        if !model.authorize().await? {
            return Ok(Outcome::Deferred);
        }
        model.delete_resources(&Self::resources(model)).await?;
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
