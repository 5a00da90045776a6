//! Access policy bindings between principals and capabilities

use crate::core::error::ProvisioningError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A capability an executing principal may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Pull revisions from the source repository
    SourcePull,
    /// Emit build and host logs
    LogEmit,
    /// Read artifacts from the artifact store
    ArtifactRead,
    /// Write artifacts to the artifact store
    ArtifactWrite,
    /// Start deployments against a target group
    DeployOrchestrate,
}

impl Capability {
    /// Whether this capability touches the artifact store
    pub fn is_artifact_access(&self) -> bool {
        matches!(self, Capability::ArtifactRead | Capability::ArtifactWrite)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::SourcePull => "source_pull",
            Capability::LogEmit => "log_emit",
            Capability::ArtifactRead => "artifact_read",
            Capability::ArtifactWrite => "artifact_write",
            Capability::DeployOrchestrate => "deploy_orchestrate",
        };
        f.write_str(name)
    }
}

/// The role a principal plays when the stage graph invokes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorRole {
    Source,
    Build,
    Deploy,
    TargetHost,
}

impl ExecutorRole {
    /// Minimum capability set the role's actions invoke
    pub fn required_capabilities(&self) -> &'static [Capability] {
        match self {
            ExecutorRole::Source => &[Capability::SourcePull, Capability::ArtifactWrite],
            ExecutorRole::Build => &[
                Capability::ArtifactRead,
                Capability::ArtifactWrite,
                Capability::LogEmit,
            ],
            ExecutorRole::Deploy => &[Capability::ArtifactRead, Capability::DeployOrchestrate],
            ExecutorRole::TargetHost => &[Capability::ArtifactRead, Capability::LogEmit],
        }
    }
}

/// A (principal, capabilities, scope) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub principal: String,
    pub capabilities: BTreeSet<Capability>,
    /// Resource names covered by the binding; `*` covers everything
    pub scope: Vec<String>,
}

impl PolicyBinding {
    /// Whether the scope covers the named resource
    pub fn covers(&self, resource: &str) -> bool {
        self.scope.iter().any(|s| s == "*" || s == resource)
    }
}

/// The set of declared bindings, one per principal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessPolicies {
    bindings: BTreeMap<String, PolicyBinding>,
}

impl AccessPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding; a principal may be bound once
    pub fn bind(
        &mut self,
        principal: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        scope: Vec<String>,
    ) -> Result<(), ProvisioningError> {
        let principal = principal.into();
        if self.bindings.contains_key(&principal) {
            return Err(ProvisioningError::DuplicateName {
                kind: "principal",
                name: principal,
            });
        }
        self.bindings.insert(
            principal.clone(),
            PolicyBinding {
                principal,
                capabilities: capabilities.into_iter().collect(),
                scope,
            },
        );
        Ok(())
    }

    pub fn binding(&self, principal: &str) -> Option<&PolicyBinding> {
        self.bindings.get(principal)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &PolicyBinding> {
        self.bindings.values()
    }

    /// Check every referenced principal holds exactly the capabilities its roles need
    ///
    /// `usages` maps a principal to the roles in which the stage graph invokes it.
    pub fn verify(
        &self,
        usages: &BTreeMap<String, Vec<ExecutorRole>>,
        artifact_store: &str,
    ) -> Result<(), ProvisioningError> {
        for (principal, roles) in usages {
            let binding = self
                .binding(principal)
                .ok_or_else(|| ProvisioningError::UnboundPrincipal {
                    principal: principal.clone(),
                })?;

            let required: BTreeSet<Capability> = roles
                .iter()
                .flat_map(|role| role.required_capabilities().iter().copied())
                .collect();

            if let Some(missing) = required.difference(&binding.capabilities).next() {
                return Err(ProvisioningError::MissingCapability {
                    principal: principal.clone(),
                    capability: *missing,
                });
            }
            if let Some(excess) = binding.capabilities.difference(&required).next() {
                return Err(ProvisioningError::ExcessCapability {
                    principal: principal.clone(),
                    capability: *excess,
                });
            }
            if binding.capabilities.iter().any(Capability::is_artifact_access)
                && !binding.covers(artifact_store)
            {
                return Err(ProvisioningError::ScopeMismatch {
                    principal: principal.clone(),
                    store: artifact_store.to_string(),
                });
            }
        }

        for binding in self.bindings.values() {
            if !usages.contains_key(&binding.principal) {
                tracing::warn!(
                    "Principal '{}' is bound but not referenced by any action",
                    binding.principal
                );
            }
        }

        Ok(())
    }
}
