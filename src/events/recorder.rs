use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use chrono::Utc;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::core::v1::EventSource;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;

use crate::error::Result;
use crate::events::types::EventData;
use crate::events::types::Reason;
use crate::events::EmitEvent;
use crate::k8s::ObjectRepository;
use crate::TryResource;

/// Implementation of EmitEvent that creates core/v1 Events through an [ObjectRepository]
pub struct EventRecorder<C>
where
    C: ObjectRepository,
{
    cluster: Arc<C>,
    component: Cow<'static, str>,
}

impl<C> EventRecorder<C>
where
    C: ObjectRepository,
{
    /// `component` appears as source of the events, e.g. `mme-charm`.
    pub fn new(cluster: Arc<C>, component: impl Into<Cow<'static, str>>) -> Self {
        Self {
            cluster,
            component: component.into(),
        }
    }
}

#[async_trait]
impl<C, R> EmitEvent<R> for EventRecorder<C>
where
    C: ObjectRepository,
    R: Reason,
{
    #[tracing::instrument(
        skip(self, object),
        fields(
            object_kind = %K::kind(&()),
            object_name = %object.try_name().unwrap_or_default(),
            object_namespace = %object.try_namespace().unwrap_or_default(),
            event_type = %event.type_,
            event_reason = %event.reason,
        )
    )]
    async fn try_emit<K>(&self, object: &K, event: EventData<R>) -> Result<()>
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync,
    {
        let namespace = object.try_namespace()?;
        let name = object.try_name()?;

        let now = Utc::now();
        let event_name = format!("{name}.{:x}", now.timestamp_nanos_opt().unwrap_or_default());
        // Going through serde keeps this independent of the time crate k8s-openapi is built with.
        let timestamp: Time = serde_json::from_value(serde_json::Value::String(
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))?;

        let k8s_event = Event {
            metadata: ObjectMeta {
                name: Some(event_name),
                namespace: Some(namespace.to_owned()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some(K::api_version(&()).to_string()),
                kind: Some(K::kind(&()).to_string()),
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                uid: object.meta().uid.to_owned(),
                resource_version: object.meta().resource_version.to_owned(),
                ..Default::default()
            },
            reason: Some(event.reason.to_string()),
            message: Some(event.message),
            type_: Some(event.type_.to_string()),
            first_timestamp: Some(timestamp.clone()),
            last_timestamp: Some(timestamp),
            count: Some(1),
            source: Some(EventSource {
                component: Some(self.component.to_string()),
                ..Default::default()
            }),
            reporting_component: Some(self.component.to_string()),
            action: event.action,
            ..Default::default()
        };

        self.cluster.create(&namespace, &k8s_event).await?;

        Ok(())
    }
}
