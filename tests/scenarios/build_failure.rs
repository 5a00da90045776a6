//! Test: Build Failure - a failing build halts the run before any deployment

use crate::helpers::*;
use stagegate::core::{RunStatus, StageFailure, StageState};
use stagegate::execution::ExecutionEvent;
use std::time::Duration;

#[tokio::test]
async fn test_failed_build_halts_run() {
    let harness = Harness::new(Setup {
        build_exit_code: 2,
        ..Default::default()
    });
    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_stage_succeeded(&run, "Source");
    assert_stage_failed(&run, "Build", "Build exited with status 2");
    assert_stage_never_ran(&run, "Deploy-DEV");
    assert_stage_never_ran(&run, "Approve");
    assert_stage_never_ran(&run, "Deploy-PRD");

    assert!(harness.deployer.deployments().is_empty());
    assert!(harness.approver.requests().is_empty());
    assert!(run.context.artifact("build_output").is_none());
    assert_eq!(harness.started_stages(run.run_id), vec!["Source", "Build"]);
}

#[tokio::test]
async fn test_failed_build_is_reported_once() {
    let harness = Harness::new(Setup {
        build_exit_code: 1,
        ..Default::default()
    });
    let run = harness.run().await;

    let failures: Vec<_> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::StageFailed { stage, failure, .. } => Some((stage, failure)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Build");
    assert!(matches!(failures[0].1, StageFailure::Execution { .. }));
    assert_eq!(run.failure().map(|(stage, _)| stage), Some("Build"));
}

#[tokio::test]
async fn test_build_timeout_fails_stage() {
    let yaml = DEMO_PIPELINE.replace(
        "        principal: \"build-role\"",
        "        principal: \"build-role\"\n        timeout_secs: 1",
    );
    let harness = Harness::new(Setup {
        yaml,
        build_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });
    let run = harness.run().await;

    assert_stage_failed(&run, "Build", "timed out after 1 seconds");
    assert_eq!(run.stage_state("Deploy-DEV"), Some(&StageState::Pending));
    assert!(harness.deployer.deployments().is_empty());
}
