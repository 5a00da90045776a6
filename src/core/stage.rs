//! Stage and action domain model

use crate::core::{
    config::{BuildEnvironmentConfig, DeployPolicy, RepositoryConfig},
    policy::ExecutorRole,
    target::TargetGroup,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Variables a source action publishes for later stages
pub const SOURCE_VARIABLES: &[&str] = &["commit_id", "commit_message", "branch", "repository"];

/// Variables a build action publishes for later stages
pub const BUILD_VARIABLES: &[&str] = &["artifact_digest", "artifact_version"];

/// Variables a deploy action publishes for later stages
pub const DEPLOY_VARIABLES: &[&str] = &["deployed_hosts"];

/// A named, ordered step of the pipeline
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    /// Artifacts consumed by this stage's actions
    pub fn inputs(&self) -> Vec<&str> {
        self.actions.iter().filter_map(Action::input).collect()
    }

    /// Artifacts produced by this stage's actions
    pub fn outputs(&self) -> Vec<&str> {
        self.actions.iter().filter_map(Action::output).collect()
    }

    /// Whether the stage suspends on a human decision
    pub fn is_gate(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a.kind, ActionKind::Approval { .. }))
    }
}

/// A unit of work within a stage
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    /// Executing principal (approval actions run as the pipeline itself)
    pub principal: Option<String>,
    pub kind: ActionKind,
}

/// The four kinds of work a stage can perform
#[derive(Debug, Clone)]
pub enum ActionKind {
    Source {
        repository: RepositoryConfig,
        output: String,
    },
    Build {
        environment: BuildEnvironmentConfig,
        input: String,
        output: String,
        timeout_secs: Option<u64>,
    },
    Deploy {
        target_group: TargetGroup,
        input: String,
        policy: DeployPolicy,
    },
    Approval {
        info: Template,
        link: Template,
        timeout_secs: Option<u64>,
    },
}

impl Action {
    pub fn input(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Build { input, .. } | ActionKind::Deploy { input, .. } => Some(input),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Source { output, .. } | ActionKind::Build { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Role the executing principal plays for this action
    pub fn role(&self) -> Option<ExecutorRole> {
        match self.kind {
            ActionKind::Source { .. } => Some(ExecutorRole::Source),
            ActionKind::Build { .. } => Some(ExecutorRole::Build),
            ActionKind::Deploy { .. } => Some(ExecutorRole::Deploy),
            ActionKind::Approval { .. } => None,
        }
    }

    /// Variables this action publishes under its stage name
    pub fn published_variables(&self) -> &'static [&'static str] {
        match self.kind {
            ActionKind::Source { .. } => SOURCE_VARIABLES,
            ActionKind::Build { .. } => BUILD_VARIABLES,
            ActionKind::Deploy { .. } => DEPLOY_VARIABLES,
            ActionKind::Approval { .. } => &[],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ActionKind::Source { .. } => "source",
            ActionKind::Build { .. } => "build",
            ActionKind::Deploy { .. } => "deploy",
            ActionKind::Approval { .. } => "approval",
        }
    }
}

/// A string with `{{ Stage.variable }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_-]+)\.([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder regex")
    })
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `(stage, variable)` pairs referenced by the template
    pub fn references(&self) -> Vec<(String, String)> {
        placeholder_regex()
            .captures_iter(&self.source)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    }

    /// Substitute stage variables; unknown placeholders are left as written
    pub fn render(&self, variables: &BTreeMap<String, BTreeMap<String, String>>) -> String {
        placeholder_regex()
            .replace_all(&self.source, |caps: &regex::Captures| {
                variables
                    .get(&caps[1])
                    .and_then(|vars| vars.get(&caps[2]))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}
