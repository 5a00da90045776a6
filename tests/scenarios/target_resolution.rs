//! Test: Target Resolution - group membership is read at deploy time

use crate::helpers::*;
use stagegate::core::{Host, RunStatus};

#[tokio::test]
async fn test_hosts_added_between_runs_are_deployed() {
    let harness = Harness::demo();

    let first = harness.run().await;
    assert_eq!(first.context.variable("Deploy-DEV", "deployed_hosts"), Some("10.0.0.1"));

    harness
        .inventory
        .add_host(Host::new("dev-2", "10.0.0.2").labelled(&dev()))
        .await;

    let second = harness.run().await;
    assert_eq!(second.status(), RunStatus::Succeeded);
    assert_eq!(
        second.context.variable("Deploy-DEV", "deployed_hosts"),
        Some("10.0.0.1,10.0.0.2")
    );
    assert_eq!(harness.deployer.deployed_to("dev-2").len(), 1);
}

#[tokio::test]
async fn test_removed_host_is_skipped() {
    let harness = Harness::new(Setup {
        hosts: vec![
            Host::new("dev-1", "10.0.0.1").labelled(&dev()),
            Host::new("dev-2", "10.0.0.2").labelled(&dev()),
            Host::new("prd-1", "10.0.1.1").labelled(&prd()),
        ],
        ..Default::default()
    });
    assert!(harness.inventory.remove_host("dev-1").await);

    let run = harness.run().await;
    assert_eq!(run.context.variable("Deploy-DEV", "deployed_hosts"), Some("10.0.0.2"));
    assert!(harness.deployer.deployed_to("dev-1").is_empty());
}

#[tokio::test]
async fn test_other_labels_are_never_selected() {
    let harness = Harness::new(Setup {
        hosts: vec![
            Host::new("dev-1", "10.0.0.1").labelled(&dev()),
            Host::new("prd-1", "10.0.1.1").labelled(&prd()),
            Host::new("other-dev", "10.9.0.1")
                .with_tag("application", "OtherApp")
                .with_tag("environment", "DEV"),
            Host::new("untagged", "10.9.0.2"),
        ],
        ..Default::default()
    });
    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Succeeded);
    let touched: Vec<_> = harness
        .deployer
        .deployments()
        .into_iter()
        .map(|d| d.host_id)
        .collect();
    assert_eq!(touched.len(), 2);
    assert!(!touched.iter().any(|h| h == "other-dev" || h == "untagged"));

    // DEV and PRD never overlap
    assert_eq!(harness.deployer.deployed_to("dev-1").len(), 1);
    assert_eq!(harness.deployer.deployed_to("prd-1").len(), 1);
}
