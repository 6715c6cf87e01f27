//! In-memory store used in dev mode and tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::DateTime;
use tokio::sync::RwLock;

use super::{NamingRecordStore, NetworkStore, UserStore};
use crate::db::schemas::{Metadata, NamingRecordDoc, NetworkDoc, UserDoc};
use crate::types::{PorticoError, Result};

/// Process-local implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    networks: Arc<RwLock<HashMap<String, NetworkDoc>>>,
    users: Arc<RwLock<HashMap<String, UserDoc>>>,
    records: Arc<RwLock<HashMap<String, NamingRecordDoc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored IPNS entries
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn find_network(&self, name: &str) -> Result<Option<NetworkDoc>> {
        Ok(self.networks.read().await.get(name).cloned())
    }

    async fn insert_network(&self, mut network: NetworkDoc) -> Result<()> {
        let mut networks = self.networks.write().await;
        if networks.contains_key(&network.name) {
            return Err(PorticoError::AlreadyExists(format!(
                "network {} already exists",
                network.name
            )));
        }
        network.metadata = Metadata::new();
        networks.insert(network.name.clone(), network);
        Ok(())
    }

    async fn add_authorized_user(&self, name: &str, address: &str) -> Result<()> {
        let mut networks = self.networks.write().await;
        let network = networks
            .get_mut(name)
            .ok_or_else(|| PorticoError::NotFound(format!("network {} not found", name)))?;
        if !network.is_authorized(address) {
            network.authorized_users.push(address.to_string());
            network.metadata.touch();
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, address: &str) -> Result<Option<UserDoc>> {
        Ok(self.users.read().await.get(address).cloned())
    }

    async fn insert_user(&self, mut user: UserDoc) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.address) {
            return Err(PorticoError::AlreadyExists(format!(
                "account {} already exists",
                user.address
            )));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(PorticoError::AlreadyExists(format!(
                "email {} already registered",
                user.email
            )));
        }
        user.metadata = Metadata::new();
        users.insert(user.address.clone(), user);
        Ok(())
    }

    async fn replace_user(&self, mut user: UserDoc, expected_revision: i64) -> Result<bool> {
        let mut users = self.users.write().await;
        let Some(current) = users.get(&user.address) else {
            return Err(PorticoError::NotFound(format!(
                "account {} not found",
                user.address
            )));
        };
        if current.revision != expected_revision {
            return Ok(false);
        }
        user.revision = expected_revision + 1;
        user.metadata.touch();
        users.insert(user.address.clone(), user);
        Ok(true)
    }
}

#[async_trait]
impl NamingRecordStore for MemoryStore {
    async fn find_record(&self, record_name: &str) -> Result<Option<NamingRecordDoc>> {
        Ok(self.records.read().await.get(record_name).cloned())
    }

    async fn upsert_record(&self, mut record: NamingRecordDoc) -> Result<()> {
        let mut records = self.records.write().await;
        let now = DateTime::now();
        record.metadata.created_at = records
            .get(&record.record_name)
            .and_then(|existing| existing.metadata.created_at)
            .or(Some(now));
        record.metadata.updated_at = Some(now);
        records.insert(record.record_name.clone(), record);
        Ok(())
    }
}
