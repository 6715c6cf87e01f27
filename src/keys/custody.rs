//! Key custody
//!
//! Key material lives in each network's IPFS keystore. Who may publish
//! under a key is recorded on the user account, so ownership checks never
//! touch the endpoint.

use tracing::{info, warn};

use crate::accounts::AccountLedger;
use crate::db::schemas::OwnedKey;
use crate::ipfs::StorageEndpoint;
use crate::types::{PorticoError, Result};

/// Name IPFS reserves for the node's own identity key
const RESERVED_KEY_NAME: &str = "self";

#[derive(Clone)]
pub struct KeyCustody {
    accounts: AccountLedger,
}

impl KeyCustody {
    pub fn new(accounts: AccountLedger) -> Self {
        Self { accounts }
    }

    pub async fn owns_key(&self, address: &str, key_name: &str) -> Result<bool> {
        Ok(self.accounts.find(address).await?.owns_key(key_name))
    }

    pub async fn key_identifier_for(&self, address: &str, key_name: &str) -> Result<String> {
        self.accounts
            .find(address)
            .await?
            .key_id(key_name)
            .map(String::from)
            .ok_or_else(|| {
                PorticoError::NotFound(format!("key {} not owned by {}", key_name, address))
            })
    }

    /// Record that `address` owns `key_name`, in a single account write
    pub async fn grant_key(&self, address: &str, key_name: &str, key_id: &str) -> Result<()> {
        self.accounts.grant_key(address, key_name, key_id).await?;
        info!(address = %address, key = %key_name, "Key granted");
        Ok(())
    }

    pub async fn list_keys(&self, address: &str) -> Result<Vec<OwnedKey>> {
        Ok(self.accounts.find(address).await?.keys)
    }

    /// Generate a key in the endpoint keystore and grant it to `address`
    pub async fn create_key(
        &self,
        address: &str,
        endpoint: &dyn StorageEndpoint,
        key_name: &str,
    ) -> Result<OwnedKey> {
        validate_key_name(key_name)?;
        if self.owns_key(address, key_name).await? {
            return Err(PorticoError::AlreadyExists(format!(
                "key {} already owned by user",
                key_name
            )));
        }

        let generated = endpoint.generate_key(key_name).await?;
        self.grant_key(address, &generated.name, &generated.id)
            .await?;

        Ok(OwnedKey {
            name: generated.name,
            id: generated.id,
        })
    }

    /// Confirm the endpoint keystore holds `key_name`
    pub async fn confirm_in_keystore(
        &self,
        endpoint: &dyn StorageEndpoint,
        key_name: &str,
        key_id: &str,
    ) -> Result<()> {
        let keys = endpoint.list_keys().await?;
        let stored = keys
            .iter()
            .find(|k| k.name == key_name)
            .ok_or_else(|| PorticoError::KeyNotFound(key_name.to_string()))?;

        if stored.id != key_id {
            warn!(
                key = %key_name,
                owned_id = %key_id,
                keystore_id = %stored.id,
                "Keystore identifier differs from owned identifier"
            );
        }
        Ok(())
    }
}

fn validate_key_name(key_name: &str) -> Result<()> {
    if key_name.trim().is_empty() {
        return Err(PorticoError::Validation("key name is required".into()));
    }
    if key_name == RESERVED_KEY_NAME {
        return Err(PorticoError::Validation(format!(
            "key name {} is reserved",
            RESERVED_KEY_NAME
        )));
    }
    if key_name.contains('/') || key_name.chars().any(char::is_whitespace) {
        return Err(PorticoError::Validation(format!(
            "key name {:?} may not contain '/' or whitespace",
            key_name
        )));
    }
    Ok(())
}
