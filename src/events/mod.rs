//! Best-effort Kubernetes events on the objects the charms modify. A failed event is logged
//! and never fails a hook.

pub mod types;

mod recorder;

pub use recorder::EventRecorder;
pub use types::CharmEventReason;
pub use types::EventData;
pub use types::EventType;
pub use types::Reason;

use async_trait::async_trait;
use kube::Resource;

use crate::error::Result;
use crate::TryResource;

/// Trait for emitting Kubernetes events
#[async_trait]
pub trait EmitEvent<R>: Send + Sync
where
    R: Reason,
{
    /// Try to emit a Kubernetes event, returning any errors
    async fn try_emit<K>(&self, object: &K, event: EventData<R>) -> Result<()>
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync;

    /// Emit a Kubernetes event, logging but not propagating errors
    async fn emit<K>(&self, object: &K, event: EventData<R>)
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync,
    {
        let reason = event.reason.to_owned();
        if let Err(e) = self.try_emit(object, event).await {
            tracing::warn!(
                error = %e,
                reason = %reason,
                "Failed to emit event"
            );
        }
    }
}
