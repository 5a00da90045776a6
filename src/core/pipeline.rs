//! Immutable pipeline definition, validated once at provisioning time

use crate::core::{
    config::{ActionConfig, PipelineConfig, RepositoryConfig},
    error::ProvisioningError,
    policy::{AccessPolicies, ExecutorRole},
    stage::{Action, ActionKind, Stage, Template},
    target::{LabelSelector, TargetGroup},
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Artifact store the pipeline writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStoreRef {
    pub name: String,
    pub root: Option<PathBuf>,
}

/// A validated pipeline definition
///
/// Built once from configuration; runs never mutate it. Changing the stage
/// graph means building a new definition.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,
    pub artifact_store: ArtifactStoreRef,
    pub policies: AccessPolicies,
    pub target_groups: BTreeMap<String, TargetGroup>,
    stages: Vec<Stage>,
}

impl PipelineDefinition {
    /// Build and validate a definition from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ProvisioningError> {
        if config.name.trim().is_empty() {
            return Err(ProvisioningError::InvalidValue {
                field: "name".to_string(),
                reason: "pipeline name must not be empty".to_string(),
            });
        }
        if config.stages.is_empty() {
            return Err(ProvisioningError::NoStages);
        }

        let mut policies = AccessPolicies::new();
        for principal in &config.principals {
            policies.bind(
                principal.name.clone(),
                principal.capabilities.iter().copied(),
                principal.scope.clone(),
            )?;
        }

        let repositories = Self::index_repositories(&config.repositories)?;
        let target_groups = Self::build_target_groups(config)?;

        let mut stages = Vec::with_capacity(config.stages.len());
        let mut stage_names = HashSet::new();
        for stage_config in &config.stages {
            if !stage_names.insert(stage_config.name.as_str()) {
                return Err(ProvisioningError::DuplicateName {
                    kind: "stage",
                    name: stage_config.name.clone(),
                });
            }
            if stage_config.actions.is_empty() {
                return Err(ProvisioningError::EmptyStage(stage_config.name.clone()));
            }

            let mut action_names = HashSet::new();
            let mut actions = Vec::with_capacity(stage_config.actions.len());
            for action_config in &stage_config.actions {
                if !action_names.insert(action_config.name()) {
                    return Err(ProvisioningError::DuplicateName {
                        kind: "action",
                        name: format!("{}/{}", stage_config.name, action_config.name()),
                    });
                }
                actions.push(Self::build_action(action_config, &repositories, &target_groups)?);
            }

            stages.push(Stage {
                name: stage_config.name.clone(),
                actions,
            });
        }

        Self::check_artifact_flow(&stages)?;
        Self::check_templates(&stages)?;

        let usages = Self::principal_usages(&stages, &target_groups);
        policies.verify(&usages, &config.artifact_store.name)?;

        debug!(
            "Validated pipeline '{}' with {} stages",
            config.name,
            stages.len()
        );

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            artifact_store: ArtifactStoreRef {
                name: config.artifact_store.name.clone(),
                root: config.artifact_store.root.clone(),
            },
            policies,
            target_groups,
            stages,
        })
    }

    /// Stages in declaration (and execution) order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn target_group(&self, name: &str) -> Option<&TargetGroup> {
        self.target_groups.get(name)
    }

    /// Principals executing actions of the given role
    pub fn principals_for(&self, role: ExecutorRole) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .filter(|a| a.role() == Some(role))
            .filter_map(|a| a.principal.as_deref())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn index_repositories(
        repositories: &[RepositoryConfig],
    ) -> Result<HashMap<String, RepositoryConfig>, ProvisioningError> {
        let mut index = HashMap::new();
        for repo in repositories {
            if index.insert(repo.name.clone(), repo.clone()).is_some() {
                return Err(ProvisioningError::DuplicateName {
                    kind: "repository",
                    name: repo.name.clone(),
                });
            }
        }
        Ok(index)
    }

    fn build_target_groups(
        config: &PipelineConfig,
    ) -> Result<BTreeMap<String, TargetGroup>, ProvisioningError> {
        let mut groups: BTreeMap<String, TargetGroup> = BTreeMap::new();
        for group in &config.target_groups {
            let selector = LabelSelector::new(group.app_label.clone(), group.env_label.clone());

            if let Some(existing) = groups.values().find(|g| !g.selector.is_disjoint(&selector)) {
                return Err(ProvisioningError::OverlappingTargetGroups {
                    first: existing.name.clone(),
                    second: group.name.clone(),
                    app_label: selector.app_label,
                    env_label: selector.env_label,
                });
            }

            let target = TargetGroup {
                name: group.name.clone(),
                selector,
                host_principal: group.host_principal.clone(),
            };
            if groups.insert(group.name.clone(), target).is_some() {
                return Err(ProvisioningError::DuplicateName {
                    kind: "target group",
                    name: group.name.clone(),
                });
            }
        }
        Ok(groups)
    }

    fn build_action(
        config: &ActionConfig,
        repositories: &HashMap<String, RepositoryConfig>,
        target_groups: &BTreeMap<String, TargetGroup>,
    ) -> Result<Action, ProvisioningError> {
        let action = match config {
            ActionConfig::Source {
                name,
                repository,
                output,
                principal,
            } => {
                let repository = repositories.get(repository).cloned().ok_or_else(|| {
                    ProvisioningError::UndefinedReference {
                        action: name.clone(),
                        kind: "repository",
                        name: repository.clone(),
                    }
                })?;
                Action {
                    name: name.clone(),
                    principal: Some(principal.clone()),
                    kind: ActionKind::Source {
                        repository,
                        output: output.clone(),
                    },
                }
            }
            ActionConfig::Build {
                name,
                environment,
                input,
                output,
                principal,
                timeout_secs,
            } => {
                if environment.commands.is_empty() {
                    return Err(ProvisioningError::InvalidValue {
                        field: format!("{}.environment.commands", name),
                        reason: "at least one build command is required".to_string(),
                    });
                }
                Action {
                    name: name.clone(),
                    principal: Some(principal.clone()),
                    kind: ActionKind::Build {
                        environment: environment.clone(),
                        input: input.clone(),
                        output: output.clone(),
                        timeout_secs: *timeout_secs,
                    },
                }
            }
            ActionConfig::Deploy {
                name,
                target_group,
                input,
                policy,
                principal,
            } => {
                let group = target_groups.get(target_group).cloned().ok_or_else(|| {
                    ProvisioningError::UndefinedReference {
                        action: name.clone(),
                        kind: "target group",
                        name: target_group.clone(),
                    }
                })?;
                Action {
                    name: name.clone(),
                    principal: Some(principal.clone()),
                    kind: ActionKind::Deploy {
                        target_group: group,
                        input: input.clone(),
                        policy: *policy,
                    },
                }
            }
            ActionConfig::Approval {
                name,
                info,
                link,
                timeout_secs,
            } => {
                if *timeout_secs == Some(0) {
                    return Err(ProvisioningError::InvalidValue {
                        field: format!("{}.timeout_secs", name),
                        reason: "timeout must be positive".to_string(),
                    });
                }
                Action {
                    name: name.clone(),
                    principal: None,
                    kind: ActionKind::Approval {
                        info: Template::new(info.clone()),
                        link: Template::new(link.clone()),
                        timeout_secs: *timeout_secs,
                    },
                }
            }
        };
        Ok(action)
    }

    /// Each artifact has one producer, and is consumed only after an earlier stage produced it
    fn check_artifact_flow(stages: &[Stage]) -> Result<(), ProvisioningError> {
        let mut producers: HashMap<&str, &str> = HashMap::new();

        for stage in stages {
            for action in &stage.actions {
                if let Some(input) = action.input() {
                    if !producers.contains_key(input) {
                        return Err(ProvisioningError::ConsumedBeforeProduced {
                            action: action.name.clone(),
                            artifact: input.to_string(),
                        });
                    }
                }
            }
            for action in &stage.actions {
                if let Some(output) = action.output() {
                    if let Some(first) = producers.insert(output, &action.name) {
                        return Err(ProvisioningError::MultipleProducers {
                            artifact: output.to_string(),
                            first: first.to_string(),
                            second: action.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Approval templates may only reference variables published by earlier stages
    fn check_templates(stages: &[Stage]) -> Result<(), ProvisioningError> {
        let mut published: HashMap<&str, HashSet<&str>> = HashMap::new();

        for stage in stages {
            for action in &stage.actions {
                if let ActionKind::Approval { info, link, .. } = &action.kind {
                    for (stage_name, variable) in info.references().into_iter().chain(link.references()) {
                        let known = published
                            .get(stage_name.as_str())
                            .is_some_and(|vars| vars.contains(variable.as_str()));
                        if !known {
                            return Err(ProvisioningError::UnknownTemplateVariable {
                                action: action.name.clone(),
                                variable: format!("{}.{}", stage_name, variable),
                            });
                        }
                    }
                }
            }
            let vars = published.entry(stage.name.as_str()).or_default();
            for action in &stage.actions {
                vars.extend(action.published_variables().iter().copied());
            }
        }
        Ok(())
    }

    fn principal_usages(
        stages: &[Stage],
        target_groups: &BTreeMap<String, TargetGroup>,
    ) -> BTreeMap<String, Vec<ExecutorRole>> {
        let mut usages: BTreeMap<String, Vec<ExecutorRole>> = BTreeMap::new();

        for action in stages.iter().flat_map(|s| s.actions.iter()) {
            if let (Some(principal), Some(role)) = (&action.principal, action.role()) {
                usages.entry(principal.clone()).or_default().push(role);
            }
        }

        // Only groups the stage graph deploys to need a host principal
        for action in stages.iter().flat_map(|s| s.actions.iter()) {
            if let ActionKind::Deploy { target_group, .. } = &action.kind {
                if let Some(group) = target_groups.get(&target_group.name) {
                    usages
                        .entry(group.host_principal.clone())
                        .or_default()
                        .push(ExecutorRole::TargetHost);
                }
            }
        }

        usages
    }
}
