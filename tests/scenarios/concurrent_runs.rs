//! Test: Concurrent Runs - runs of one definition never share artifacts

use crate::helpers::*;
use stagegate::artifact::ArtifactStore;
use stagegate::collaborators::{ApprovalDecision, ChannelApproval};
use stagegate::core::RunStatus;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_runs_keep_their_own_artifacts() {
    let harness = Harness::new(Setup {
        commits: vec![("abc123", "fix login bug"), ("def456", "add audit log")],
        ..Default::default()
    });

    let (first, second) = tokio::join!(harness.run(), harness.run());

    assert_eq!(first.status(), RunStatus::Succeeded);
    assert_eq!(second.status(), RunStatus::Succeeded);
    assert_ne!(first.run_id, second.run_id);

    let first_build = first.context.artifact("build_output").unwrap();
    let second_build = second.context.artifact("build_output").unwrap();
    assert_ne!(first_build.key, second_build.key);
    assert_ne!(first_build.digest, second_build.digest);
    assert!(first_build.key.contains(&first.run_id.to_string()));

    // Each run promoted exactly what it built
    assert_eq!(first.context.consumed_by("deploy-prd"), Some(first_build));
    assert_eq!(second.context.consumed_by("deploy-prd"), Some(second_build));

    let commits: HashSet<&str> = [&first, &second]
        .into_iter()
        .filter_map(|run| run.context.variable("Source", "commit_id"))
        .collect();
    assert_eq!(commits, HashSet::from(["abc123", "def456"]));

    for build in [first_build, second_build] {
        assert_eq!(
            harness.store.list_versions(&build.key).await.unwrap(),
            vec![build.version]
        );
    }
}

#[tokio::test]
async fn test_gates_are_decided_per_run() {
    let (channel, handle) = ChannelApproval::new();
    let harness = Harness::new(Setup {
        commits: vec![("abc123", "fix login bug"), ("def456", "add audit log")],
        approvals: Some(Arc::new(channel)),
        ..Default::default()
    });

    let first = tokio::spawn({
        let engine = harness.engine.clone();
        async move { engine.trigger().await }
    });
    let second = tokio::spawn({
        let engine = harness.engine.clone();
        async move { engine.trigger().await }
    });

    let a = handle.next_request().await.unwrap();
    let b = handle.next_request().await.unwrap();
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(handle.pending().await.len(), 2);

    handle.decide(a.run_id, "Approve", ApprovalDecision::approve()).await.unwrap();
    handle.decide(b.run_id, "Approve", ApprovalDecision::reject()).await.unwrap();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    let (approved, rejected) = if first.run_id == a.run_id {
        (first, second)
    } else {
        (second, first)
    };

    assert_eq!(approved.status(), RunStatus::Succeeded);
    assert_eq!(rejected.status(), RunStatus::Failed);
    assert_stage_never_ran(&rejected, "Deploy-PRD");

    let prd = harness.deployer.deployed_to("prd-1");
    assert_eq!(prd.len(), 1);
    assert_eq!(
        prd[0].digest,
        approved.context.artifact("build_output").unwrap().digest
    );
}
