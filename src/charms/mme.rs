//! The MME charm. Its four containers (`mme`, `s1ap`, `s6a`, `s11`) share scripts and
//! configuration through ConfigMap and emptyDir volumes the charm adds to the StatefulSet.

use async_trait::async_trait;

use crate::charms::thing;
use crate::charms::workload_outcome;
use crate::error::Result;
use crate::k8s::ObjectRepository;
use crate::model::Model;
use crate::pebble::ensure_service;
use crate::pebble::layer::Service;
use crate::pebble::Workload;
use crate::resources::mme::MmeResources;
use crate::unit::Unit;
use crate::unit::UnitStatus;
use crate::Charm;
use crate::Outcome;

const RUN_SCRIPT: &str = "/opt/mme/scripts/mme-run.sh";

#[derive(Debug, Clone, Copy, Default)]
pub struct MmeCharm;

impl MmeCharm {
    fn resources<C, U, W>(model: &Model<C, U, W>) -> MmeResources
    where
        C: ObjectRepository,
    {
        MmeResources::new(&model.env.app_name, &model.env.namespace, model.env.files_dir())
    }

    /// Declares and starts the service of every MME container.
    async fn start_services<C, U, W>(model: &Model<C, U, W>) -> Result<()>
    where
        C: ObjectRepository,
        U: Unit,
        W: Workload,
    {
        let thing = thing(model).await?;
        let pod_ip = model.pod_ip().await?;

        for (container, app, summary) in [("mme", "mme-app", "mme-app"), ("s1ap", "s1ap-app", "mme-s1ap")] {
            let service = Service::new(summary, run_command(app))
                .env("thing", thing.as_str())
                .env("POD_IP", pod_ip.as_str())
                .env("MMERUNENV", "container");
            ensure_service(&model.workload, container, container, service).await?;
        }

        for (container, app, summary) in [("s6a", "s6a-app", "mme-s6a"), ("s11", "s11-app", "mme-s11")] {
            let service = Service::new(summary, run_command(app)).env("MMERUNENV", "container");
            ensure_service(&model.workload, container, container, service).await?;
        }

        Ok(())
    }
}

fn run_command(app: &str) -> String {
    format!("/bin/bash -xc \"{RUN_SCRIPT} {app}\"")
}

#[async_trait]
impl<C, U, W> Charm<C, U, W> for MmeCharm
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    fn name(&self) -> &'static str {
        "mme"
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
        if !model.authorize().await? {
            return Ok(Outcome::Deferred);
        }
        model.patch_statefulset(&MmeResources::statefulset_patch()).await?;

        let outcome = workload_outcome(Self::start_services(model).await)?;
        if outcome == Outcome::Done {
            model.unit.set_status(UnitStatus::active()).await?;
        }
        Ok(outcome)
    }
}
