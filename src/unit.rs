//! The unit as seen through the Juju hook tools: status, configuration, actions and addressing.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::CharmConfig;
use crate::error::Error;
use crate::error::Result;

/// The workload status of a unit, the only health signal visible to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Active(String),
    Maintenance(String),
    Waiting(String),
    /// Operator intervention is required, e.g. `juju trust`.
    Blocked(String),
}

impl UnitStatus {
    pub fn active() -> Self {
        UnitStatus::Active(String::new())
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        UnitStatus::Maintenance(message.into())
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        UnitStatus::Waiting(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        UnitStatus::Blocked(message.into())
    }

    /// The status name as understood by `status-set`.
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Active(_) => "active",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active(message)
            | UnitStatus::Maintenance(message)
            | UnitStatus::Waiting(message)
            | UnitStatus::Blocked(message) => message,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            "" => f.write_str(self.name()),
            message => write!(f, "{}: {message}", self.name()),
        }
    }
}

/// Access to the unit's model. Implemented on top of the hook tools for production and by an
/// in-memory fake in tests.
#[async_trait]
pub trait Unit: Send + Sync {
    async fn set_status(&self, status: UnitStatus) -> Result<()>;

    async fn config(&self) -> Result<CharmConfig>;

    /// The parameters of the running action as a JSON object.
    async fn action_params(&self) -> Result<serde_json::Value>;

    async fn set_action_results(&self, results: &BTreeMap<String, String>) -> Result<()>;

    async fn fail_action(&self, message: &str) -> Result<()>;

    /// The address of the unit's pod.
    async fn private_address(&self) -> Result<IpAddr>;

    async fn is_leader(&self) -> Result<bool>;
}

/// [Unit] implementation that shells out to the Juju hook tools in `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookTools;

impl HookTools {
    async fn run(tool: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(tool).args(args).output().await.map_err(|e| Error::HookTool {
            tool: tool.to_owned(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(Error::HookTool {
                tool: tool.to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

#[async_trait]
impl Unit for HookTools {
    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        log::info!(status:% = status; "Setting unit status");
        Self::run("status-set", &[status.name(), status.message()]).await?;
        Ok(())
    }

    async fn config(&self) -> Result<CharmConfig> {
        let raw = Self::run("config-get", &["--format=json"]).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn action_params(&self) -> Result<serde_json::Value> {
        let raw = Self::run("action-get", &["--format=json"]).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn set_action_results(&self, results: &BTreeMap<String, String>) -> Result<()> {
        let pairs: Vec<String> = results.iter().map(|(key, value)| format!("{key}={value}")).collect();
        let args: Vec<&str> = pairs.iter().map(String::as_str).collect();
        Self::run("action-set", &args).await?;
        Ok(())
    }

    async fn fail_action(&self, message: &str) -> Result<()> {
        Self::run("action-fail", &[message]).await?;
        Ok(())
    }

    async fn private_address(&self) -> Result<IpAddr> {
        let raw = Self::run("unit-get", &["private-address"]).await?;
        raw.parse()
            .map_err(|_| Error::UserInput(format!("unit-get returned an invalid address '{raw}'")))
    }

    async fn is_leader(&self) -> Result<bool> {
        let raw = Self::run("is-leader", &["--format=json"]).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}
