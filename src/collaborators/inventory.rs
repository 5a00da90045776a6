//! Static host inventory

use crate::collaborators::{CollaboratorError, HostInventory};
use crate::core::target::{Host, LabelSelector};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Host list held in memory; hosts can be added or removed between deploys
pub struct StaticInventory {
    hosts: RwLock<Vec<Host>>,
}

impl StaticInventory {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
        }
    }

    pub async fn add_host(&self, host: Host) {
        self.hosts.write().await.push(host);
    }

    /// Remove a host by id; returns whether it was present
    pub async fn remove_host(&self, id: &str) -> bool {
        let mut hosts = self.hosts.write().await;
        let before = hosts.len();
        hosts.retain(|h| h.id != id);
        hosts.len() != before
    }
}

#[async_trait]
impl HostInventory for StaticInventory {
    async fn resolve(&self, selector: &LabelSelector) -> Result<Vec<Host>, CollaboratorError> {
        let hosts = self.hosts.read().await;
        Ok(hosts
            .iter()
            .filter(|h| selector.matches(&h.tags))
            .cloned()
            .collect())
    }
}
