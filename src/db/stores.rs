//! MongoDB-backed implementations of the store traits

use async_trait::async_trait;
use bson::{doc, DateTime};
use tracing::debug;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    NamingRecordDoc, NetworkDoc, UserDoc, NAMING_RECORD_COLLECTION, NETWORK_COLLECTION,
    USER_COLLECTION,
};
use crate::store::{NamingRecordStore, NetworkStore, UserStore};
use crate::types::{PorticoError, Result};

/// Persistence over the `networks`, `users` and `ipns_entries` collections
#[derive(Clone)]
pub struct MongoStore {
    networks: MongoCollection<NetworkDoc>,
    users: MongoCollection<UserDoc>,
    records: MongoCollection<NamingRecordDoc>,
}

impl MongoStore {
    /// Open the collections and apply their indexes
    pub async fn open(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            networks: client.collection(NETWORK_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
            records: client.collection(NAMING_RECORD_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl NetworkStore for MongoStore {
    async fn find_network(&self, name: &str) -> Result<Option<NetworkDoc>> {
        self.networks.find_one(doc! { "name": name }).await
    }

    async fn insert_network(&self, network: NetworkDoc) -> Result<()> {
        let name = network.name.clone();
        self.networks.insert_one(network).await.map_err(|e| match e {
            PorticoError::AlreadyExists(_) => {
                PorticoError::AlreadyExists(format!("network {} already exists", name))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn add_authorized_user(&self, name: &str, address: &str) -> Result<()> {
        let result = self
            .networks
            .update_one(
                doc! { "name": name, "metadata.is_deleted": { "$ne": true } },
                doc! {
                    "$addToSet": { "authorized_users": address },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(PorticoError::NotFound(format!("network {} not found", name)));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn find_user(&self, address: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "address": address }).await
    }

    async fn insert_user(&self, user: UserDoc) -> Result<()> {
        self.users.insert_one(user).await.map_err(|e| match e {
            PorticoError::AlreadyExists(_) => {
                PorticoError::AlreadyExists("account address or email already registered".into())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn replace_user(&self, mut user: UserDoc, expected_revision: i64) -> Result<bool> {
        let filter = doc! {
            "address": &user.address,
            "revision": expected_revision,
        };
        user.revision = expected_revision + 1;

        let matched = self.users.replace_one(filter, user).await?;
        if matched == 0 {
            debug!(expected_revision, "User revision moved, replace skipped");
        }
        Ok(matched == 1)
    }
}

#[async_trait]
impl NamingRecordStore for MongoStore {
    async fn find_record(&self, record_name: &str) -> Result<Option<NamingRecordDoc>> {
        self.records
            .find_one(doc! { "record_name": record_name })
            .await
    }

    async fn upsert_record(&self, record: NamingRecordDoc) -> Result<()> {
        let filter = doc! { "record_name": &record.record_name };
        self.records.upsert_one(filter, record).await
    }
}
