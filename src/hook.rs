//! Hooks as delivered by Juju through `JUJU_DISPATCH_PATH`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

const PEBBLE_READY_SUFFIX: &str = "-pebble-ready";

/// A lifecycle event or action delivered to the charm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "kebab-case")]
pub enum Hook {
    Install,
    ConfigChanged,
    UpgradeCharm,
    Remove,
    /// `<container>-pebble-ready`, carrying the container name.
    WorkloadReady(String),
    /// An action, carrying the action name.
    Action(String),
    /// Any hook no charm in this crate reacts to, e.g. `update-status`.
    Other(String),
}

impl Hook {
    pub fn is_action(&self) -> bool {
        matches!(self, Hook::Action(_))
    }
}

impl FromStr for Hook {
    type Err = Error;

    /// Parses a dispatch path such as `hooks/install`, `hooks/mme-pebble-ready` or
    /// `actions/fortune`.
    fn from_str(dispatch_path: &str) -> Result<Self, Self::Err> {
        let (kind, name) = dispatch_path
            .trim_matches('/')
            .split_once('/')
            .ok_or_else(|| Error::UnknownHook(dispatch_path.to_owned()))?;

        match kind {
            "actions" if !name.is_empty() => Ok(Hook::Action(name.to_owned())),
            "hooks" => Ok(match name {
                "install" => Hook::Install,
                "config-changed" => Hook::ConfigChanged,
                "upgrade-charm" => Hook::UpgradeCharm,
                "remove" => Hook::Remove,
                other => match other.strip_suffix(PEBBLE_READY_SUFFIX) {
                    Some(container) if !container.is_empty() => Hook::WorkloadReady(container.to_owned()),
                    _ if other.is_empty() => return Err(Error::UnknownHook(dispatch_path.to_owned())),
                    _ => Hook::Other(other.to_owned()),
                },
            }),
            _ => Err(Error::UnknownHook(dispatch_path.to_owned())),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Install => f.write_str("install"),
            Hook::ConfigChanged => f.write_str("config-changed"),
            Hook::UpgradeCharm => f.write_str("upgrade-charm"),
            Hook::Remove => f.write_str("remove"),
            Hook::WorkloadReady(container) => write!(f, "{container}{PEBBLE_READY_SUFFIX}"),
            Hook::Action(action) => write!(f, "{action} action"),
            Hook::Other(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_lifecycle_hooks() {
        assert_eq!("hooks/install".parse::<Hook>().unwrap(), Hook::Install);
        assert_eq!("hooks/config-changed".parse::<Hook>().unwrap(), Hook::ConfigChanged);
        assert_eq!("hooks/upgrade-charm".parse::<Hook>().unwrap(), Hook::UpgradeCharm);
        assert_eq!("hooks/remove".parse::<Hook>().unwrap(), Hook::Remove);
    }

    #[test]
    fn test_parses_pebble_ready_with_container_name() {
        // Given: The pebble-ready hook of a container with a dash in its name
        let hook = "hooks/mme-app-pebble-ready".parse::<Hook>().unwrap();

        // Then: The whole prefix is the container name
        assert_eq!(hook, Hook::WorkloadReady("mme-app".to_owned()));
        assert_eq!(hook.to_string(), "mme-app-pebble-ready");
    }

    #[test]
    fn test_parses_actions() {
        let hook = "actions/fortune".parse::<Hook>().unwrap();

        assert_eq!(hook, Hook::Action("fortune".to_owned()));
        assert!(hook.is_action());
    }

    #[test]
    fn test_unhandled_hooks_are_kept_by_name() {
        assert_eq!(
            "hooks/update-status".parse::<Hook>().unwrap(),
            Hook::Other("update-status".to_owned())
        );
        assert_eq!("hooks/-pebble-ready".parse::<Hook>().unwrap(), Hook::Other("-pebble-ready".to_owned()));
    }

    #[test]
    fn test_rejects_malformed_dispatch_paths() {
        assert!(matches!("install".parse::<Hook>(), Err(Error::UnknownHook(_))));
        assert!(matches!("relations/install".parse::<Hook>(), Err(Error::UnknownHook(_))));
        assert!(matches!("hooks/".parse::<Hook>(), Err(Error::UnknownHook(_))));
        assert!(matches!("actions/".parse::<Hook>(), Err(Error::UnknownHook(_))));
    }

    #[test]
    fn test_hooks_survive_persistence() {
        // Given: A deferred workload-ready hook
        let hook = Hook::WorkloadReady("spgwu".to_owned());

        // When: Storing and loading it as JSON
        let stored = serde_json::to_string(&hook).unwrap();
        let loaded: Hook = serde_json::from_str(&stored).unwrap();

        // Then: The container name is preserved
        assert_eq!(loaded, hook);
    }
}
