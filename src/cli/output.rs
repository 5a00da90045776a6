//! CLI output formatting

use crate::{
    core::{ProvisionedOutputs, RunStatus, StageState},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static GATE: Emoji<'_, '_> = Emoji("🚦 ", "? ");

/// Create a spinner for a long-running action
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a stage state for display
pub fn format_stage_state(state: &StageState) -> String {
    match state {
        StageState::Pending => style("PENDING").dim().to_string(),
        StageState::Running { .. } => style("RUNNING").yellow().to_string(),
        StageState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StageState::Failed { failure, .. } => {
            format!("{} ({})", style("FAILED").red(), style(failure).dim())
        }
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Pending => INFO,
    };

    let halted = summary
        .failed_stage
        .as_ref()
        .map(|stage| format!(" - halted at {}", style(stage).red()))
        .unwrap_or_default();

    format!(
        "{} {} - {} - {} ({}/{}) - {}{}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.succeeded_stages,
        summary.total_stages,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        halted
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StageStarted { stage, .. } => {
            format!("{} {}", SPINNER, style(stage).cyan())
        }
        ExecutionEvent::ActionStarted {
            stage, action, kind, ..
        } => format!(
            "  {} {}/{}",
            style(format!("[{}]", kind)).dim(),
            stage,
            style(action).bold()
        ),
        ExecutionEvent::ArtifactProduced { artifact, .. } => format!(
            "  {} {} ({} bytes, sha256 {})",
            INFO,
            style(artifact.short()).cyan(),
            artifact.size_bytes,
            style(&artifact.digest[..12.min(artifact.digest.len())]).dim()
        ),
        ExecutionEvent::HostDeployed { host, .. } => {
            format!("  {} {}", CHECK, style(host).green())
        }
        ExecutionEvent::HostFailed { host, error, .. } => {
            format!("  {} {}: {}", CROSS, style(host).red(), style(error).dim())
        }
        ExecutionEvent::ApprovalRequested { stage, link, .. } => format!(
            "{} {} awaiting approval: {}",
            GATE,
            style(stage).yellow(),
            style(link).underlined()
        ),
        ExecutionEvent::ApprovalResolved {
            stage,
            approved,
            reviewer,
            ..
        } => {
            let by = reviewer
                .as_ref()
                .map(|r| format!(" by {}", r))
                .unwrap_or_default();
            if *approved {
                format!("{} {} approved{}", CHECK, style(stage).green(), by)
            } else {
                format!("{} {} not approved{}", CROSS, style(stage).red(), by)
            }
        }
        ExecutionEvent::StageSucceeded { stage, .. } => {
            format!("{} {}", CHECK, style(stage).green())
        }
        ExecutionEvent::StageFailed { stage, failure, .. } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(failure).dim())
        }
        ExecutionEvent::RunFinished { run_id, status } => {
            let status_str = match status {
                RunStatus::Succeeded => format!("{} completed", style("successfully").green()),
                RunStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(run_id)).dim(),
                status_str
            )
        }
    }
}

/// Format provisioning outputs for display
pub fn format_outputs(outputs: &ProvisionedOutputs) -> String {
    let mut lines = vec![
        format!("  Pipeline: {}", style(&outputs.pipeline).bold()),
        format!("  Artifact store: {}", style(&outputs.artifact_store).cyan()),
    ];
    for (group, addresses) in &outputs.host_addresses {
        let hosts = if addresses.is_empty() {
            style("(no hosts)").dim().to_string()
        } else {
            addresses.join(", ")
        };
        lines.push(format!("  Hosts [{}]: {}", style(group).cyan(), hosts));
    }
    lines.push(format!("  Build principal: {}", outputs.build_principals.join(", ")));
    lines.push(format!("  Deploy principal: {}", outputs.deploy_principals.join(", ")));
    lines.join("\n")
}

/// Format output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}
