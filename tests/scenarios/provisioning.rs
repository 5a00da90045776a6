//! Test: Provisioning - malformed definitions are rejected before any run

use crate::helpers::*;
use stagegate::collaborators::StaticInventory;
use stagegate::core::config::PipelineConfig;
use stagegate::core::policy::Capability;
use stagegate::core::{Host, ProvisionedOutputs, ProvisioningError};

fn provision(yaml: &str) -> Result<(), ProvisioningError> {
    match PipelineConfig::from_yaml(yaml) {
        Ok(_) => Ok(()),
        Err(e) => Err(e
            .downcast_ref::<ProvisioningError>()
            .cloned()
            .unwrap_or_else(|| panic!("Expected provisioning error, got: {:#}", e))),
    }
}

#[test]
fn test_demo_pipeline_provisions() {
    assert_eq!(provision(DEMO_PIPELINE), Ok(()));
}

#[test]
fn test_overlapping_target_groups_rejected() {
    let yaml = DEMO_PIPELINE.replace("env_label: \"PRD\"", "env_label: \"DEV\"");
    assert!(matches!(
        provision(&yaml),
        Err(ProvisioningError::OverlappingTargetGroups { first, second, .. })
            if first == "dev" && second == "prd"
    ));
}

#[test]
fn test_missing_capability_rejected() {
    let yaml = DEMO_PIPELINE.replace(
        "capabilities: [artifact_read, deploy_orchestrate]",
        "capabilities: [artifact_read]",
    );
    assert_eq!(
        provision(&yaml),
        Err(ProvisioningError::MissingCapability {
            principal: "deploy-role".to_string(),
            capability: Capability::DeployOrchestrate,
        })
    );
}

#[test]
fn test_excess_capability_rejected() {
    let yaml = DEMO_PIPELINE.replace(
        "capabilities: [artifact_read, artifact_write, log_emit]",
        "capabilities: [artifact_read, artifact_write, log_emit, deploy_orchestrate]",
    );
    assert_eq!(
        provision(&yaml),
        Err(ProvisioningError::ExcessCapability {
            principal: "build-role".to_string(),
            capability: Capability::DeployOrchestrate,
        })
    );
}

#[test]
fn test_artifact_scope_must_cover_store() {
    let yaml = DEMO_PIPELINE.replace("scope: [\"demo-artifacts\"]", "scope: [\"other-bucket\"]");
    assert!(matches!(
        provision(&yaml),
        Err(ProvisioningError::ScopeMismatch { principal, .. }) if principal == "pipeline-role"
    ));
}

#[test]
fn test_unknown_template_variable_rejected() {
    let yaml = DEMO_PIPELINE.replace("{{ Source.commit_id }}", "{{ Source.author }}");
    assert!(matches!(
        provision(&yaml),
        Err(ProvisioningError::UnknownTemplateVariable { variable, .. }) if variable.contains("author")
    ));
}

#[test]
fn test_artifact_consumed_before_produced() {
    let yaml = DEMO_PIPELINE.replacen("input: \"build_output\"", "input: \"release_bundle\"", 1);
    assert_eq!(
        provision(&yaml),
        Err(ProvisioningError::ConsumedBeforeProduced {
            action: "deploy-dev".to_string(),
            artifact: "release_bundle".to_string(),
        })
    );
}

#[test]
fn test_undefined_target_group_rejected() {
    let yaml = DEMO_PIPELINE.replace("target_group: \"prd\"", "target_group: \"staging\"");
    assert!(matches!(
        provision(&yaml),
        Err(ProvisioningError::UndefinedReference { name, .. }) if name == "staging"
    ));
}

#[tokio::test]
async fn test_outputs_report_current_hosts() {
    let definition = PipelineConfig::from_yaml(DEMO_PIPELINE)
        .unwrap()
        .to_definition()
        .unwrap();
    let inventory = StaticInventory::new(vec![
        Host::new("dev-1", "10.0.0.1").labelled(&dev()),
        Host::new("dev-2", "10.0.0.2").labelled(&dev()),
    ]);

    let outputs = ProvisionedOutputs::collect(&definition, &inventory, "demo-artifacts")
        .await
        .unwrap();

    assert_eq!(outputs.pipeline, "DemoAppPipeline");
    assert_eq!(outputs.artifact_store, "demo-artifacts");
    assert_eq!(
        outputs.host_addresses.get("dev"),
        Some(&vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
    );
    assert_eq!(outputs.host_addresses.get("prd"), Some(&Vec::new()));
    assert_eq!(outputs.build_principals, vec!["build-role".to_string()]);
    assert_eq!(outputs.deploy_principals, vec!["deploy-role".to_string()]);
}
