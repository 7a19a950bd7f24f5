//! Pebble configuration layers.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Override {
    Merge,
    #[default]
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Startup {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    #[serde(default, rename = "override")]
    pub override_: Override,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    pub command: String,
    #[serde(default)]
    pub startup: Startup,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Service {
    /// An enabled service replacing any earlier definition of the same name.
    pub fn new(summary: impl Into<String>, command: impl Into<String>) -> Self {
        Service {
            summary: summary.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

impl Layer {
    pub fn new(summary: impl Into<String>, description: impl Into<String>) -> Self {
        Layer {
            summary: summary.into(),
            description: description.into(),
            services: BTreeMap::new(),
        }
    }

    pub fn service(mut self, name: impl Into<String>, service: Service) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Names of the services started by `autostart`.
    pub fn enabled_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, service)| service.startup == Startup::Enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The layer in the YAML form Pebble expects.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
