//! Host deployers

use crate::artifact::ArtifactRef;
use crate::collaborators::{process::run_command, CollaboratorError, HostDeployer};
use crate::core::target::Host;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs a shell command per host
///
/// The command sees `STAGEGATE_HOST_ID`, `STAGEGATE_HOST_ADDRESS`,
/// `STAGEGATE_ARTIFACT` (path to the bundle) and `STAGEGATE_ARTIFACT_DIGEST`.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    shell: String,
    command: String,
    timeout_secs: u64,
}

impl CommandDeployer {
    pub fn new(shell: String, command: String, timeout_secs: u64) -> Self {
        Self {
            shell,
            command,
            timeout_secs,
        }
    }
}

#[async_trait]
impl HostDeployer for CommandDeployer {
    async fn deploy(
        &self,
        host: &Host,
        artifact: &ArtifactRef,
        bundle: &[u8],
    ) -> Result<(), CollaboratorError> {
        let staging = tempfile::tempdir()?;
        let bundle_path = staging.path().join("bundle.tar");
        tokio::fs::write(&bundle_path, bundle).await?;

        let output = run_command(
            &self.shell,
            &["-c", &self.command],
            None,
            &[
                ("STAGEGATE_HOST_ID", host.id.clone()),
                ("STAGEGATE_HOST_ADDRESS", host.address.clone()),
                ("STAGEGATE_ARTIFACT", bundle_path.to_string_lossy().to_string()),
                ("STAGEGATE_ARTIFACT_DIGEST", artifact.digest.clone()),
            ],
            self.timeout_secs,
        )
        .await?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Deploy to {} exited with {}: {}", host.address, exit_code, stderr);
            return Err(CollaboratorError::Exit {
                program: self.shell.clone(),
                exit_code,
                stderr,
            });
        }

        info!("Deployed {} to {}", artifact.short(), host.address);
        Ok(())
    }
}

/// Installs bundles into a per-host directory and flips a `current` pointer
///
/// Layout: `<root>/<host id>/releases/<digest>.tar` and `<root>/<host id>/current`.
#[derive(Debug, Clone)]
pub struct DirectoryDeployer {
    root: PathBuf,
}

impl DirectoryDeployer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Digest of the release currently active on a host
    pub async fn current_release(&self, host_id: &str) -> Option<String> {
        tokio::fs::read_to_string(self.root.join(host_id).join("current"))
            .await
            .ok()
            .map(|s| s.trim().to_string())
    }
}

#[async_trait]
impl HostDeployer for DirectoryDeployer {
    async fn deploy(
        &self,
        host: &Host,
        artifact: &ArtifactRef,
        bundle: &[u8],
    ) -> Result<(), CollaboratorError> {
        let host_dir = self.root.join(&host.id);
        let releases = host_dir.join("releases");
        tokio::fs::create_dir_all(&releases).await?;

        let release = releases.join(format!("{}.tar", artifact.digest));
        write_atomic(&release, bundle).await?;
        write_atomic(&host_dir.join("current"), artifact.digest.as_bytes()).await?;

        debug!("Installed {} into {}", artifact.short(), release.display());
        Ok(())
    }
}

/// Write through a temp file unique to this call, then rename into place
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CollaboratorError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4()));

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
