//! Test: Success Chain - all five stages run in order and promote one build

use crate::helpers::*;
use stagegate::core::RunStatus;
use stagegate::execution::ExecutionEvent;

#[tokio::test]
async fn test_success_chain() {
    let harness = Harness::demo();
    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Succeeded);
    for stage in STAGE_ORDER {
        assert_stage_succeeded(&run, stage);
    }
    assert_eq!(harness.started_stages(run.run_id), STAGE_ORDER.to_vec());
    assert!(run.completed_at.is_some());

    assert_eq!(harness.source.pulls(), 1);
    assert_eq!(harness.sandbox.builds(), 1);
}

#[tokio::test]
async fn test_same_build_reaches_dev_and_prd() {
    let harness = Harness::demo();
    let run = harness.run().await;

    let build = run.context.artifact("build_output").expect("build output recorded");
    let dev = harness.deployer.deployed_to("dev-1");
    let prd = harness.deployer.deployed_to("prd-1");

    assert_eq!(dev.len(), 1);
    assert_eq!(prd.len(), 1);
    assert_eq!(dev[0].digest, build.digest);
    assert_eq!(prd[0].digest, build.digest);

    assert_eq!(run.context.consumed_by("deploy-dev"), Some(build));
    assert_eq!(run.context.consumed_by("deploy-prd"), Some(build));
    assert_eq!(run.context.consumed_by("compile"), run.context.artifact("source_output"));
}

#[tokio::test]
async fn test_approval_request_carries_revision() {
    let harness = Harness::demo();
    let run = harness.run().await;

    let requests = harness.approver.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].run_id, run.run_id);
    assert_eq!(requests[0].stage, "Approve");
    assert_eq!(requests[0].info, "Promote 'fix login bug' to production?");
    assert_eq!(requests[0].link, "https://git.example.com/demo/commit/abc123");
}

#[tokio::test]
async fn test_stage_variables_published() {
    let harness = Harness::demo();
    let run = harness.run().await;

    assert_eq!(run.context.variable("Source", "commit_id"), Some("abc123"));
    assert_eq!(run.context.variable("Source", "branch"), Some("main"));
    assert_eq!(run.context.variable("Deploy-DEV", "deployed_hosts"), Some("10.0.0.1"));
    assert_eq!(run.context.variable("Deploy-PRD", "deployed_hosts"), Some("10.0.1.1"));

    let build = run.context.artifact("build_output").unwrap();
    assert_eq!(
        run.context.variable("Build", "artifact_digest"),
        Some(build.digest.as_str())
    );
}

#[tokio::test]
async fn test_events_bracket_the_run() {
    let harness = Harness::demo();
    let run = harness.run().await;
    let events = harness.events();

    assert!(matches!(
        events.first(),
        Some(ExecutionEvent::RunStarted { run_id, .. }) if *run_id == run.run_id
    ));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunFinished { status: RunStatus::Succeeded, .. })
    ));

    let produced = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::ArtifactProduced { .. }))
        .count();
    assert_eq!(produced, 2);

    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::ApprovalResolved { approved: true, reviewer: Some(r), .. } if r == "release-manager"
    )));
}
