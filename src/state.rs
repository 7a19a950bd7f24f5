//! State that survives between hook invocations.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::hook::Hook;

/// Persisted charm state, stored as JSON in the charm directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Every distinct `thing` config value seen so far.
    #[serde(default)]
    pub things: Vec<String>,
    /// Hooks to re-emit before the next hook.
    #[serde(default)]
    pub deferred: Vec<Hook>,
}

impl StoredState {
    /// Loads the state, starting empty when nothing was stored yet.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the state through a temporary file so an interrupted hook never leaves a
    /// truncated state behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Records `thing`, returns whether it was new.
    pub fn remember_thing(&mut self, thing: &str) -> bool {
        if self.things.iter().any(|known| known == thing) {
            return false;
        }
        self.things.push(thing.to_owned());
        true
    }

    pub fn defer(&mut self, hook: Hook) {
        if !self.deferred.contains(&hook) {
            self.deferred.push(hook);
        }
    }

    pub fn take_deferred(&mut self) -> Vec<Hook> {
        std::mem::take(&mut self.deferred)
    }
}
