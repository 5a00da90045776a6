//! Test: Partial Deploy - one failing host fails the whole deployment stage

use crate::helpers::*;
use stagegate::core::{Host, RunStatus};
use stagegate::execution::ExecutionEvent;
use std::time::Duration;

fn two_dev_hosts() -> Vec<Host> {
    vec![
        Host::new("dev-1", "10.0.0.1").labelled(&dev()),
        Host::new("dev-2", "10.0.0.2").labelled(&dev()),
        Host::new("prd-1", "10.0.1.1").labelled(&prd()),
    ]
}

#[tokio::test]
async fn test_one_failed_host_fails_stage() {
    let harness = Harness::new(Setup {
        hosts: two_dev_hosts(),
        failing_hosts: vec!["dev-2"],
        ..Default::default()
    });
    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_stage_failed(&run, "Deploy-DEV", "failed on 1 of 2 host(s): 10.0.0.2");
    assert_stage_never_ran(&run, "Approve");
    assert_stage_never_ran(&run, "Deploy-PRD");

    // The healthy host was still updated
    assert_eq!(harness.deployer.deployed_to("dev-1").len(), 1);
    assert!(harness.deployer.deployed_to("prd-1").is_empty());
    assert!(harness.approver.requests().is_empty());

    let events = harness.events();
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::HostFailed { host, .. } if host == "10.0.0.2"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::HostDeployed { host, .. } if host == "10.0.0.1"
    )));
}

#[tokio::test]
async fn test_all_hosts_deployed_concurrently() {
    // Neither DEV deploy can finish until both have started
    let harness = Harness::new(Setup {
        hosts: two_dev_hosts(),
        rendezvous_hosts: vec!["dev-1", "dev-2"],
        ..Default::default()
    });
    let run = tokio::time::timeout(Duration::from_secs(5), harness.run())
        .await
        .expect("host deploys should overlap");

    assert_eq!(run.status(), RunStatus::Succeeded);
    assert_eq!(
        run.context.variable("Deploy-DEV", "deployed_hosts"),
        Some("10.0.0.1,10.0.0.2")
    );
    assert_eq!(harness.deployer.deployments().len(), 3);
}

#[tokio::test]
async fn test_empty_group_fails_stage() {
    let harness = Harness::new(Setup {
        hosts: vec![Host::new("dev-1", "10.0.0.1").labelled(&dev())],
        ..Default::default()
    });
    let run = harness.run().await;

    assert_stage_succeeded(&run, "Deploy-DEV");
    assert_stage_succeeded(&run, "Approve");
    assert_stage_failed(&run, "Deploy-PRD", "Target group 'prd' resolved to no hosts");
    assert_eq!(run.status(), RunStatus::Failed);
}
