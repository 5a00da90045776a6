//! Compute target groups selected by application/environment labels

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tag key carrying the application label
pub const APPLICATION_TAG: &str = "application";

/// Tag key carrying the environment label
pub const ENVIRONMENT_TAG: &str = "environment";

/// Label predicate: application label AND environment label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSelector {
    pub app_label: String,
    pub env_label: String,
}

impl LabelSelector {
    pub fn new(app_label: impl Into<String>, env_label: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            env_label: env_label.into(),
        }
    }

    /// Whether a host's tags satisfy the predicate
    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        tags.get(APPLICATION_TAG) == Some(&self.app_label)
            && tags.get(ENVIRONMENT_TAG) == Some(&self.env_label)
    }

    /// Two equality predicates over the same keys are disjoint unless identical
    pub fn is_disjoint(&self, other: &LabelSelector) -> bool {
        self != other
    }
}

/// A named group of hosts addressed by reference, resolved at deploy time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub name: String,
    pub selector: LabelSelector,
    /// Principal the hosts in this group run as
    pub host_principal: String,
}

/// A concrete deployable host returned by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Host {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Tag the host for a selector
    pub fn labelled(self, selector: &LabelSelector) -> Self {
        self.with_tag(APPLICATION_TAG, selector.app_label.clone())
            .with_tag(ENVIRONMENT_TAG, selector.env_label.clone())
    }
}
