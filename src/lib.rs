//! `omec-charms` contains the Juju sidecar charms for the OMEC EPC network functions: HSS, MME,
//! SPGW-C and SPGW-U. A single binary, `omec-charm`, is installed as the dispatch target of
//! every charm and routes each hook to the matching [Charm] implementation.
//!
//! ## How a hook is handled
//!
//! Juju runs the dispatch binary once per hook. The binary builds a [Model] (Kubernetes
//! repository, Juju hook tools, Pebble client, persisted state) and calls [dispatch], which
//!
//! 1. re-emits every hook a previous invocation deferred,
//! 2. routes the current hook to [Charm::handle],
//! 3. records the hook for later if the handler returned [Outcome::Deferred].
//!
//! ## Reconciliation
//!
//! The charms need Kubernetes objects Juju cannot express in charm metadata. Each network
//! function describes them in a [resources::DesiredState] implementation; the
//! [resources::Resources] reconciler then creates or patches them:
//!
//! ```rust,ignore
//! use omec_charms::resources::Resources;
//! use omec_charms::resources::spgwc::SpgwcResources;
//!
//! let desired = SpgwcResources::new("spgwc", "ns1", files_dir);
//! let resources = Resources::new(&cluster, &desired);
//!
//! // Creates `spgwc-cp-comm` on the first call, patches it on every following call.
//! resources.apply().await?;
//! resources.apply().await?;
//!
//! // Not-found objects are skipped, so this never fails on a fresh namespace.
//! resources.delete().await?;
//! ```
//!
//! Pod-level additions (volumes, mounts keyed by container name, init containers) go through
//! the [statefulset::StatefulSetPatcher], which records every applied patch in an annotation
//! on the StatefulSet so a patch is written at most once.
//!
//! ## Error Handling
//!
//! All fallible operations return [error::Result]. Permission problems while talking to the
//! cluster turn the unit `Blocked` instead of failing the hook (see [auth::AuthGate]), an
//! unreachable Pebble socket defers the hook, everything else is propagated to the binary
//! which exits non-zero so that Juju retries the hook.

pub mod auth;
pub mod charms;
pub mod config;
pub mod error;
pub mod events;
pub mod hook;
pub mod k8s;
pub mod model;
pub mod pebble;
pub mod resources;
pub mod state;
pub mod statefulset;
pub mod unit;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::Resource;
use kube::ResourceExt;

pub use crate::hook::Hook;
pub use crate::model::Model;

use crate::error::Error;
use crate::error::Result;
use crate::k8s::ObjectRepository;
use crate::pebble::Workload;
use crate::unit::Unit;

const FORTUNE: &str = "A bug in the code is worth two in the documentation.";

/// The result of handling a single hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The hook was fully handled.
    Done,
    /// The hook could not be handled yet and is re-emitted on the next dispatch.
    Deferred,
}

/// The Charm trait contains the hook handlers of one network function.
///
/// Every handler has a no-op default, so a charm only implements the hooks it cares about.
/// Handlers need to be idempotent: Juju retries failed hooks and deferred hooks are re-emitted
/// before each new one.
#[async_trait]
pub trait Charm<C, U, W>: Send + Sync
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    /// The application this charm operates, e.g. `mme`.
    fn name(&self) -> &'static str;

    /// Routes a hook to its handler.
    ///
    /// Called by [dispatch] for the current hook and every re-emitted deferred hook.
    async fn handle(&self, model: &mut Model<C, U, W>, hook: &Hook) -> Result<Outcome> {
        match hook {
            Hook::Install => self.on_install(model).await,
            Hook::ConfigChanged => self.on_config_changed(model).await,
            Hook::UpgradeCharm => self.on_upgrade_charm(model).await,
            Hook::Remove => self.on_remove(model).await,
            Hook::WorkloadReady(container) => self.on_workload_ready(model, container).await,
            Hook::Action(action) => self.on_action(model, action).await,
            Hook::Other(name) => {
                log::debug!(charm = self.name(), hook = name.as_str(); "No handler registered");
                Ok(Outcome::Done)
            }
        }
    }

    async fn on_install(&self, _model: &mut Model<C, U, W>) -> Result<Outcome> {
        Ok(Outcome::Done)
    }

    async fn on_config_changed(&self, _model: &mut Model<C, U, W>) -> Result<Outcome> {
        Ok(Outcome::Done)
    }

    async fn on_upgrade_charm(&self, _model: &mut Model<C, U, W>) -> Result<Outcome> {
        Ok(Outcome::Done)
    }

    async fn on_remove(&self, _model: &mut Model<C, U, W>) -> Result<Outcome> {
        Ok(Outcome::Done)
    }

    /// Handles `<container>-pebble-ready`, fired once Pebble in the container accepts requests.
    async fn on_workload_ready(&self, _model: &mut Model<C, U, W>, _container: &str) -> Result<Outcome> {
        Ok(Outcome::Done)
    }

    /// Handles an action. All charms share the `fortune` action.
    async fn on_action(&self, model: &mut Model<C, U, W>, action: &str) -> Result<Outcome> {
        match action {
            "fortune" => {
                let params = model.unit.action_params().await?;
                let fail = params.get("fail").and_then(|fail| fail.as_str()).unwrap_or_default();
                if fail.is_empty() {
                    let results = BTreeMap::from([("fortune".to_owned(), FORTUNE.to_owned())]);
                    model.unit.set_action_results(&results).await?;
                } else {
                    model.unit.fail_action(fail).await?;
                }
            }
            unknown => {
                model.unit.fail_action(&format!("Unknown action '{unknown}'")).await?;
            }
        }
        Ok(Outcome::Done)
    }
}

/// Runs previously deferred hooks followed by `hook`.
///
/// Hooks that defer again are kept in [state::StoredState] for the next dispatch. Persisting
/// the state is left to the caller, and it only happens after a successful dispatch, so a
/// failing hook leaves the stored deferred hooks untouched.
pub async fn dispatch<H, C, U, W>(charm: &H, model: &mut Model<C, U, W>, hook: Hook) -> Result<()>
where
    H: Charm<C, U, W> + ?Sized,
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    for deferred in model.state.take_deferred() {
        log::info!(charm = charm.name(), hook:% = deferred; "Re-emitting deferred hook");
        run_hook(charm, model, deferred).await?;
    }
    run_hook(charm, model, hook).await
}

async fn run_hook<H, C, U, W>(charm: &H, model: &mut Model<C, U, W>, hook: Hook) -> Result<()>
where
    H: Charm<C, U, W> + ?Sized,
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    match charm.handle(model, &hook).await? {
        Outcome::Done => {
            log::debug!(charm = charm.name(), hook:% = hook; "Hook handled");
        }
        Outcome::Deferred if hook.is_action() => {
            log::warn!(charm = charm.name(), hook:% = hook; "Actions cannot be deferred, dropping");
        }
        Outcome::Deferred => {
            log::info!(charm = charm.name(), hook:% = hook; "Deferring hook");
            model.state.defer(hook);
        }
    }
    Ok(())
}

/// The TryResource trait is used to try to extract the name and the namespace of a resources
/// metadata and encapsulates the error handling.
pub trait TryResource {
    fn try_name(&self) -> Result<&str>;
    fn try_namespace(&self) -> Result<String>;
}

impl<R> TryResource for R
where
    R: Resource,
{
    fn try_name(&self) -> Result<&str> {
        self.meta().name.as_deref().ok_or(Error::UnnamedObject)
    }

    fn try_namespace(&self) -> Result<String> {
        self.namespace().ok_or(Error::UserInput({
            "Expected resource to be namespaced. Can't deploy to an unknown namespace.".to_owned()
        }))
    }
}
