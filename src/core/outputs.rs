//! Values reported after provisioning

use crate::collaborators::{CollaboratorError, HostInventory};
use crate::core::{pipeline::PipelineDefinition, policy::ExecutorRole};
use serde::Serialize;
use std::collections::BTreeMap;

/// What a provisioned pipeline exposes to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedOutputs {
    pub pipeline: String,
    pub artifact_store: String,
    /// Target group -> addresses of currently matching hosts
    pub host_addresses: BTreeMap<String, Vec<String>>,
    pub build_principals: Vec<String>,
    pub deploy_principals: Vec<String>,
}

impl ProvisionedOutputs {
    /// Collect outputs, resolving each target group against the inventory
    pub async fn collect(
        definition: &PipelineDefinition,
        inventory: &dyn HostInventory,
        store_id: &str,
    ) -> Result<Self, CollaboratorError> {
        let mut host_addresses = BTreeMap::new();
        for (name, group) in &definition.target_groups {
            let hosts = inventory.resolve(&group.selector).await?;
            host_addresses.insert(
                name.clone(),
                hosts.into_iter().map(|h| h.address).collect(),
            );
        }

        let owned = |role| {
            definition
                .principals_for(role)
                .into_iter()
                .map(String::from)
                .collect()
        };

        Ok(Self {
            pipeline: definition.name.clone(),
            artifact_store: store_id.to_string(),
            host_addresses,
            build_principals: owned(ExecutorRole::Build),
            deploy_principals: owned(ExecutorRole::Deploy),
        })
    }
}
