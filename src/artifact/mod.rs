//! Versioned artifact storage shared by the stages of a run

pub mod filesystem;
pub mod memory;

pub use filesystem::FsArtifactStore;
pub use memory::InMemoryArtifactStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Error types for artifact store operations
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {key}@{version}")]
    NotFound { key: String, version: Uuid },

    #[error("Artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact {key}@{version} failed digest check")]
    Corrupt { key: String, version: Uuid },
}

/// Reference to one immutable version of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Store key (`<pipeline>/<run>/<artifact>`)
    pub key: String,

    /// Version id assigned by the store on `put`
    pub version: Uuid,

    /// Hex-encoded SHA-256 of the content
    pub digest: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// When the version was written
    pub created_at: DateTime<Utc>,
}

impl ArtifactRef {
    /// Describe freshly written content
    pub fn describe(key: &str, version: Uuid, bytes: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            version,
            digest: digest(bytes),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        }
    }

    /// Short form for display
    pub fn short(&self) -> String {
        format!("{}@{}", self.key, &self.version.to_string()[..8])
    }
}

/// Hex-encoded SHA-256 of the content
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Key under which a run stores a named artifact
pub fn run_key(pipeline: &str, run_id: Uuid, artifact: &str) -> String {
    format!("{}/{}/{}", pipeline, run_id, artifact)
}

/// Append-only versioned object storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Identifier exposed as a provisioning output
    fn id(&self) -> &str;

    /// Store a new version under `key`; existing versions are never replaced
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError>;

    /// Read a specific version
    async fn get(&self, key: &str, version: Uuid) -> Result<Vec<u8>, ArtifactError>;

    /// All retained versions of `key`, oldest first
    async fn list_versions(&self, key: &str) -> Result<Vec<Uuid>, ArtifactError>;

    /// Read a version and check it still matches the recorded digest
    async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let bytes = self.get(&artifact.key, artifact.version).await?;
        if digest(&bytes) != artifact.digest {
            return Err(ArtifactError::Corrupt {
                key: artifact.key.clone(),
                version: artifact.version,
            });
        }
        Ok(bytes)
    }
}
