//! In-memory artifact store (for testing or ephemeral runs)

use crate::artifact::{ArtifactError, ArtifactRef, ArtifactStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct InMemoryArtifactStore {
    id: String,
    versions: RwLock<HashMap<String, Vec<(Uuid, Vec<u8>)>>>,
}

impl InMemoryArtifactStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            versions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        let version = Uuid::new_v4();
        let artifact = ArtifactRef::describe(key, version, &bytes);

        let mut versions = self.versions.write().await;
        versions
            .entry(key.to_string())
            .or_insert_with(Vec::new)
            .push((version, bytes));

        Ok(artifact)
    }

    async fn get(&self, key: &str, version: Uuid) -> Result<Vec<u8>, ArtifactError> {
        let versions = self.versions.read().await;
        versions
            .get(key)
            .and_then(|list| list.iter().find(|(v, _)| *v == version))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ArtifactError::NotFound {
                key: key.to_string(),
                version,
            })
    }

    async fn list_versions(&self, key: &str) -> Result<Vec<Uuid>, ArtifactError> {
        let versions = self.versions.read().await;
        Ok(versions
            .get(key)
            .map(|list| list.iter().map(|(v, _)| *v).collect())
            .unwrap_or_default())
    }
}
