use anyhow::{Context, Result};
use stagegate::artifact::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use stagegate::cli::commands::{HistoryCommand, OutputsCommand, RunCommand, ValidateCommand};
use stagegate::cli::output::*;
use stagegate::cli::terminal_output::TerminalReporter;
use stagegate::cli::{Cli, Command};
use stagegate::collaborators::{
    Collaborators, CommandDeployer, DirectoryDeployer, GitSourceProvider, HostDeployer,
    ProcessBuildSandbox, RuntimeConfig, StaticInventory, TerminalApproval,
};
use stagegate::core::config::PipelineConfig;
use stagegate::core::{PipelineDefinition, PipelineRun, ProvisionedOutputs, RunStatus};
use stagegate::execution::ExecutionEngine;
use stagegate::persistence::{
    create_summary, InMemoryPersistence, PersistenceBackend, RunSummary, SqliteRunStore,
};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Outputs(cmd) => show_outputs(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_definition(config: &PipelineConfig) -> Result<PipelineDefinition> {
    config
        .to_definition()
        .with_context(|| format!("Invalid pipeline definition '{}'", config.name))
}

fn runtime_config(cmd: &RunCommand) -> RuntimeConfig {
    let mut runtime = RuntimeConfig::new().with_git_path(cmd.git_path.clone());
    if let Some(timeout) = cmd.timeout {
        runtime = runtime.with_timeout(timeout);
    }
    if let Some(command) = &cmd.deploy_command {
        runtime = runtime.with_deploy_command(command.clone());
    }
    if let Some(root) = &cmd.deploy_root {
        runtime = runtime.with_deploy_root(root.clone());
    }
    runtime
}

async fn artifact_store(config: &PipelineConfig, ephemeral: bool) -> Result<Arc<dyn ArtifactStore>> {
    let id = config.artifact_store.name.clone();
    if ephemeral {
        return Ok(Arc::new(InMemoryArtifactStore::new(id)));
    }
    let store = match &config.artifact_store.root {
        Some(root) => FsArtifactStore::new(id, root).await,
        None => FsArtifactStore::with_default_path(id).await,
    }
    .context("Failed to open artifact store")?;
    Ok(Arc::new(store))
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = Arc::new(load_definition(&config)?);

    println!("{} Loaded pipeline: {}", INFO, style(&definition.name).bold());

    // Set up persistence
    let history: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteRunStore::with_default_path().await?)
    };

    let runtime = runtime_config(cmd);
    let deployer: Arc<dyn HostDeployer> = match &runtime.deploy_command {
        Some(command) => Arc::new(CommandDeployer::new(
            runtime.shell.clone(),
            command.clone(),
            runtime.command_timeout_secs,
        )),
        None => Arc::new(DirectoryDeployer::new(runtime.deploy_root.clone())),
    };
    let collaborators = Collaborators {
        source: Arc::new(GitSourceProvider::new(
            runtime.git_path.clone(),
            runtime.command_timeout_secs,
        )),
        sandbox: Arc::new(ProcessBuildSandbox::new(
            runtime.shell.clone(),
            runtime.tar_path.clone(),
            runtime.command_timeout_secs,
        )),
        inventory: Arc::new(StaticInventory::new(config.inventory.hosts.clone())),
        deployer,
        approvals: Arc::new(TerminalApproval::new()),
    };

    let store = artifact_store(&config, cmd.ephemeral).await?;
    let reporter = Arc::new(TerminalReporter::new(definition.stages().len()));
    let engine = ExecutionEngine::new(definition.clone(), collaborators, store)
        .with_event_handler(move |event| reporter.on_event(&event));

    // Execute pipeline
    println!();
    let mut run = PipelineRun::new(&definition);
    let status = engine.execute(&mut run).await?;

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&run);
        history.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    // Print final status
    if status == RunStatus::Succeeded {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&definition.name).bold(),
            style("successfully").green()
        );
    } else {
        println!("\n{} {} {}", CROSS, style(&definition.name).bold(), style("failed").red());
        for stage in &run.stages {
            println!("  {:<12} {}", stage.name, format_stage_state(&stage.state));
        }
        if let Some((stage, failure)) = run.failure() {
            error!("Stage {} failed: {}", stage, failure);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Stages: {}", style(config.stages.len()).cyan());
            println!("  Target groups: {}", style(config.target_groups.len()).cyan());
            println!("  Principals: {}", style(config.principals.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_outputs(cmd: &OutputsCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = load_definition(&config)?;
    let inventory = StaticInventory::new(config.inventory.hosts.clone());

    let outputs = ProvisionedOutputs::collect(&definition, &inventory, &definition.artifact_store.name)
        .await
        .context("Failed to resolve target groups")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        println!("{} Provisioned outputs:", INFO);
        println!("{}", format_outputs(&outputs));
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteRunStore::with_default_path().await?;

    // If specific run ID is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    // List runs for pipeline or all
    let mut runs = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_runs(pipeline_name).await?
    } else {
        let mut all_runs = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all_runs.extend(store.list_runs(&pipeline).await?);
        }
        all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_runs
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.succeeded_stages,
        summary.total_stages
    );
    if let (Some(stage), Some(failure)) = (&summary.failed_stage, &summary.failure) {
        println!("  Halted at: {} ({})", style(stage).red(), failure);
    }

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
