use std::fmt::Debug;
use std::fmt::Display;
use strum::AsRefStr;
use strum::Display as StrumDisplay;

/// Type of Kubernetes event
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, AsRefStr)]
pub enum EventType {
    /// Normal events represent informational messages about successful operations
    Normal,
    /// Warning events represent errors, failures, or issues that need attention
    Warning,
}

/// Event reasons follow the Kubernetes convention (CamelCase).
pub trait Reason: Debug + Display + AsRef<str> + Clone + Send + Sync + 'static {}

/// The reasons the charms report on the objects they manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, AsRefStr)]
pub enum CharmEventReason {
    /// The ServiceAccounts, Services, ConfigMaps and RBAC objects were created or patched.
    ResourcesApplied,
    ResourcesDeleted,
    /// Volumes, mounts and init containers were added to the workload StatefulSet.
    StatefulSetPatched,
    /// The HSS ports were added to the application Service.
    ServicePatched,
    ServicePatchFailed,
}

impl Reason for CharmEventReason {}

/// A Kubernetes event, generic over the reason type
#[derive(Debug)]
pub struct EventData<R: Reason> {
    pub type_: EventType,
    pub reason: R,
    pub message: String,
    pub action: Option<String>,
}

impl<R: Reason> EventData<R> {
    pub fn normal(reason: R, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason,
            message: message.into(),
            action: None,
        }
    }

    pub fn warning(reason: R, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason,
            message: message.into(),
            action: None,
        }
    }

    /// The hook that triggered the event, e.g. `install`.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}
