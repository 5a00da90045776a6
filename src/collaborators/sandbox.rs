//! Build sandbox running shell commands in a throwaway directory

use crate::collaborators::{
    process::{run_checked, run_command},
    BuildOutcome, BuildRequest, BuildSandbox, CollaboratorError,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Unpacks the source archive into a temp dir, runs the build commands, and
/// packs `artifact_path` as the build output
#[derive(Debug, Clone)]
pub struct ProcessBuildSandbox {
    shell: String,
    tar_path: String,
    timeout_secs: u64,
}

impl ProcessBuildSandbox {
    pub fn new(shell: String, tar_path: String, timeout_secs: u64) -> Self {
        Self {
            shell,
            tar_path,
            timeout_secs,
        }
    }
}

#[async_trait]
impl BuildSandbox for ProcessBuildSandbox {
    async fn run(&self, request: BuildRequest<'_>) -> Result<BuildOutcome, CollaboratorError> {
        let workspace = tempfile::tempdir()?;
        let tree = workspace.path().join("src");
        tokio::fs::create_dir_all(&tree).await?;

        let archive_path = workspace.path().join("source.tar");
        tokio::fs::write(&archive_path, request.source).await?;
        run_checked(
            &self.tar_path,
            &[
                "-xf",
                &archive_path.to_string_lossy(),
                "-C",
                &tree.to_string_lossy(),
            ],
            None,
            self.timeout_secs,
        )
        .await?;

        let image = request.environment.image.clone().unwrap_or_default();
        let mut log = String::new();

        for command in &request.environment.commands {
            info!("[{}] $ {}", request.action, command);
            let output = run_command(
                &self.shell,
                &["-c", command],
                Some(&tree),
                &[("STAGEGATE_BUILD_IMAGE", image.clone())],
                self.timeout_secs,
            )
            .await?;

            log.push_str(&format!("$ {}\n", command));
            log.push_str(&String::from_utf8_lossy(&output.stdout));
            log.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.status.success() {
                let exit_code = output.status.code().unwrap_or(-1);
                warn!("[{}] command exited with {}", request.action, exit_code);
                return Ok(BuildOutcome {
                    exit_code,
                    log,
                    artifact: None,
                });
            }
        }

        let output_dir = tree.join(&request.environment.artifact_path);
        if !output_dir.is_dir() {
            warn!(
                "[{}] artifact path '{}' missing after build",
                request.action, request.environment.artifact_path
            );
            log.push_str(&format!(
                "artifact path '{}' not found\n",
                request.environment.artifact_path
            ));
            return Ok(BuildOutcome {
                exit_code: 1,
                log,
                artifact: None,
            });
        }

        let artifact = run_checked(
            &self.tar_path,
            &["-cf", "-", "-C", &output_dir.to_string_lossy(), "."],
            None,
            self.timeout_secs,
        )
        .await?;
        debug!("[{}] packaged {} bytes", request.action, artifact.len());

        Ok(BuildOutcome {
            exit_code: 0,
            log,
            artifact: Some(artifact),
        })
    }
}
