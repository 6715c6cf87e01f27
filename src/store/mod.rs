//! Persistence collaborator contracts
//!
//! The gateway reaches MongoDB through these traits so the orchestration
//! core can run against `MemoryStore` in dev mode and tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::db::schemas::{NamingRecordDoc, NetworkDoc, UserDoc};
use crate::types::Result;

/// Hosted network descriptors, keyed by name
#[async_trait]
pub trait NetworkStore: Send + Sync {
    async fn find_network(&self, name: &str) -> Result<Option<NetworkDoc>>;

    /// Fails `AlreadyExists` when the name is taken
    async fn insert_network(&self, network: NetworkDoc) -> Result<()>;

    /// Add `address` to the network's authorized set in one atomic update.
    ///
    /// Fails `NotFound` when the network is missing.
    async fn add_authorized_user(&self, name: &str, address: &str) -> Result<()>;
}

/// User accounts, keyed by caller address
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, address: &str) -> Result<Option<UserDoc>>;

    /// Fails `AlreadyExists` when the address or email is taken
    async fn insert_user(&self, user: UserDoc) -> Result<()>;

    /// Compare-and-swap on the account revision.
    ///
    /// Writes `user` with revision `expected_revision + 1` only when the
    /// stored revision still equals `expected_revision`. Returns `false`
    /// without writing when another writer got there first.
    async fn replace_user(&self, user: UserDoc, expected_revision: i64) -> Result<bool>;
}

/// IPNS entries, keyed by record name
#[async_trait]
pub trait NamingRecordStore: Send + Sync {
    async fn find_record(&self, record_name: &str) -> Result<Option<NamingRecordDoc>>;

    async fn upsert_record(&self, record: NamingRecordDoc) -> Result<()>;
}
