//! Run context - stage output variables and produced artifacts

use crate::artifact::ArtifactRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Data handed from one stage to the next within a single run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    /// Output variables per stage (stage -> name -> value)
    pub variables: BTreeMap<String, BTreeMap<String, String>>,

    /// Artifacts produced in this run (artifact name -> stored version)
    pub artifacts: BTreeMap<String, ArtifactRef>,

    /// Artifact versions consumed, per action (action -> artifact version)
    pub consumed: BTreeMap<String, ArtifactRef>,
}

impl RunContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage output variable
    pub fn set_variable(&mut self, stage: &str, key: &str, value: impl Into<String>) {
        self.variables
            .entry(stage.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Get a stage output variable
    pub fn variable(&self, stage: &str, key: &str) -> Option<&str> {
        self.variables
            .get(stage)
            .and_then(|vars| vars.get(key))
            .map(String::as_str)
    }

    /// Record the artifact version an action produced
    pub fn record_artifact(&mut self, name: &str, artifact: ArtifactRef) {
        self.artifacts.insert(name.to_string(), artifact);
    }

    /// Artifact version produced earlier in this run
    pub fn artifact(&self, name: &str) -> Option<&ArtifactRef> {
        self.artifacts.get(name)
    }

    /// Record which artifact version an action consumed
    pub fn record_consumed(&mut self, action: &str, artifact: ArtifactRef) {
        self.consumed.insert(action.to_string(), artifact);
    }

    /// Artifact version an action consumed
    pub fn consumed_by(&self, action: &str) -> Option<&ArtifactRef> {
        self.consumed.get(action)
    }
}
