//! The charms of the four network functions.

pub mod hss;
pub mod mme;
pub mod spgwc;
pub mod spgwu;

pub use hss::HssCharm;
pub use mme::MmeCharm;
pub use spgwc::SpgwcCharm;
pub use spgwu::SpgwuCharm;

use crate::error::Error;
use crate::error::Result;
use crate::k8s::ObjectRepository;
use crate::model::Model;
use crate::pebble::layer::Layer;
use crate::pebble::layer::Service;
use crate::pebble::Workload;
use crate::unit::Unit;
use crate::Outcome;

/// Turns an unreachable Pebble into a deferral of the current hook.
pub(crate) fn workload_outcome(result: Result<()>) -> Result<Outcome> {
    match result {
        Ok(()) => Ok(Outcome::Done),
        Err(Error::WorkloadUnavailable { container, source }) => {
            log::info!(container = container.as_str(), error:% = source; "Pebble socket not available, deferring");
            Ok(Outcome::Deferred)
        }
        Err(e) => Err(e),
    }
}

/// The configured `thing`, empty when unset.
pub(crate) async fn thing<C, U, W>(model: &Model<C, U, W>) -> Result<String>
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    Ok(model.config().await?.thing.unwrap_or_default())
}

/// Stores the configured `thing` in the persisted state when it was not seen before.
pub(crate) async fn remember_thing<C, U, W>(model: &mut Model<C, U, W>) -> Result<Outcome>
where
    C: ObjectRepository,
    U: Unit,
    W: Workload,
{
    let current = thing(model).await?;
    if model.state.remember_thing(&current) {
        log::debug!(thing = current.as_str(); "Found a new thing");
    }
    Ok(Outcome::Done)
}

/// A layer with the single service `name`, labelled and summarised after it.
pub(crate) fn single_service_layer(name: &str, service: Service) -> Layer {
    Layer::new(format!("{name} layer"), format!("pebble config layer for {name}")).service(name, service)
}
