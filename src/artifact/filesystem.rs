//! Filesystem-backed artifact store
//!
//! Layout: `<root>/<key>/<version>.bin` plus an append-only `versions`
//! index per key recording write order.

use crate::artifact::{ArtifactError, ArtifactRef, ArtifactStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const INDEX_FILE: &str = "versions";

pub struct FsArtifactStore {
    id: String,
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(id: impl Into<String>, root: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { id: id.into(), root })
    }

    /// Create store under the local data directory
    pub async fn with_default_path(id: impl Into<String>) -> Result<Self, ArtifactError> {
        let id = id.into();
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        let root = data_dir.join("stagegate").join("artifacts").join(&id);
        Self::new(id, root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        // Keys use '/' as separator regardless of platform
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    fn version_path(&self, key: &str, version: Uuid) -> PathBuf {
        self.key_dir(key).join(format!("{}.bin", version))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        let version = Uuid::new_v4();
        let artifact = ArtifactRef::describe(key, version, &bytes);

        let dir = self.key_dir(key);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = self.version_path(key, version);
        let tmp_path = dir.join(format!("{}.tmp", version));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        let mut index = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(INDEX_FILE))
            .await?;
        index.write_all(format!("{}\n", version).as_bytes()).await?;
        index.flush().await?;

        debug!(
            "Stored artifact {} ({} bytes) at {}",
            artifact.short(),
            artifact.size_bytes,
            final_path.display()
        );
        Ok(artifact)
    }

    async fn get(&self, key: &str, version: Uuid) -> Result<Vec<u8>, ArtifactError> {
        match tokio::fs::read(self.version_path(key, version)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactError::NotFound {
                key: key.to_string(),
                version,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self, key: &str) -> Result<Vec<Uuid>, ArtifactError> {
        let index = match tokio::fs::read_to_string(self.key_dir(key).join(INDEX_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(index
            .lines()
            .filter_map(|line| Uuid::parse_str(line.trim()).ok())
            .collect())
    }
}
