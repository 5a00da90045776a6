//! Scenario-based tests for stagegate

mod build_failure;
mod concurrent_runs;
mod partial_deploy;
mod provisioning;
mod success_chain;
mod target_resolution;
