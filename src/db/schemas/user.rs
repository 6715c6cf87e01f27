//! User account document schema
//!
//! Stores credentials, network grants and IPFS key ownership.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// An IPFS key owned by a user: keystore name and key identifier
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OwnedKey {
    pub name: String,
    pub id: String,
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public-key-derived caller address
    pub address: String,

    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default = "default_true")]
    pub account_enabled: bool,

    #[serde(default = "default_true")]
    pub api_access: bool,

    #[serde(default)]
    pub email_enabled: bool,

    #[serde(default)]
    pub enterprise_enabled: bool,

    /// Hosted networks this user may operate on, in grant order
    #[serde(default)]
    pub network_names: Vec<String>,

    /// IPFS keys owned by this user, in grant order
    #[serde(default)]
    pub keys: Vec<OwnedKey>,

    /// Bumped on every write; guards read-modify-write cycles
    #[serde(default)]
    pub revision: i64,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    pub fn new(address: String, email: String, password_hash: String, enterprise: bool) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            address,
            email,
            password_hash,
            account_enabled: true,
            api_access: true,
            email_enabled: false,
            enterprise_enabled: enterprise,
            network_names: Vec::new(),
            keys: Vec::new(),
            revision: 0,
        }
    }

    pub fn has_network(&self, network: &str) -> bool {
        self.network_names.iter().any(|n| n == network)
    }

    pub fn owns_key(&self, key_name: &str) -> bool {
        self.keys.iter().any(|k| k.name == key_name)
    }

    pub fn key_id(&self, key_name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.name == key_name)
            .map(|k| k.id.as_str())
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.name.as_str()).collect()
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.id.as_str()).collect()
    }

    /// Account view without the credential hash
    pub fn view(&self) -> UserView {
        UserView {
            address: self.address.clone(),
            email: self.email.clone(),
            account_enabled: self.account_enabled,
            api_access: self.api_access,
            email_enabled: self.email_enabled,
            enterprise_enabled: self.enterprise_enabled,
            network_names: self.network_names.clone(),
            keys: self.keys.clone(),
        }
    }
}

/// User account as returned to callers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserView {
    pub address: String,
    pub email: String,
    pub account_enabled: bool,
    pub api_access: bool,
    pub email_enabled: bool,
    pub enterprise_enabled: bool,
    pub network_names: Vec<String>,
    pub keys: Vec<OwnedKey>,
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "address": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("address_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
