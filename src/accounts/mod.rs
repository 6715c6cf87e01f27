//! User account ledger
//!
//! Credentials, enabled flags, network grants and key ownership. Every
//! read-modify-write cycle on an account goes through [`AccountLedger::update`],
//! which reloads the account, applies the mutation to a local copy and
//! persists it with a revision compare-and-swap.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{hash_password, verify_password, Identity, Role};
use crate::db::schemas::{OwnedKey, UserDoc, UserView};
use crate::store::UserStore;
use crate::types::{PorticoError, Result};

/// Attempts before a contended update gives up with `Conflict`
const MAX_UPDATE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct AccountLedger {
    users: Arc<dyn UserStore>,
    admin_address: String,
}

impl AccountLedger {
    pub fn new(users: Arc<dyn UserStore>, admin_address: impl Into<String>) -> Self {
        Self {
            users,
            admin_address: admin_address.into(),
        }
    }

    pub fn admin_address(&self) -> &str {
        &self.admin_address
    }

    /// Identity for an address, with the admin role for the configured admin
    pub fn identity_for(&self, address: &str) -> Identity {
        let role = if address == self.admin_address {
            Role::Admin
        } else {
            Role::User
        };
        Identity {
            address: address.to_string(),
            role,
        }
    }

    /// Load an account, failing `NotFound` when absent
    pub async fn find(&self, address: &str) -> Result<UserDoc> {
        self.users
            .find_user(address)
            .await?
            .ok_or_else(|| PorticoError::NotFound(format!("account {} not found", address)))
    }

    /// Apply `mutate` to a fresh copy of the account and persist it.
    ///
    /// The write only lands if no other writer bumped the revision since the
    /// read; otherwise the cycle restarts from a reload. An error returned by
    /// `mutate` aborts without writing.
    pub async fn update<F>(&self, address: &str, mut mutate: F) -> Result<UserDoc>
    where
        F: FnMut(&mut UserDoc) -> Result<()> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut user = self.find(address).await?;
            let expected = user.revision;
            mutate(&mut user)?;

            if self.users.replace_user(user.clone(), expected).await? {
                user.revision = expected + 1;
                return Ok(user);
            }
            debug!(address = %address, attempt, "Account revision moved, retrying update");
        }

        warn!(address = %address, "Account update abandoned after repeated conflicts");
        Err(PorticoError::Conflict(format!(
            "account {} is being modified concurrently",
            address
        )))
    }

    pub async fn create_account(
        &self,
        address: &str,
        email: &str,
        password: &str,
        enterprise: bool,
    ) -> Result<UserView> {
        if address.trim().is_empty() {
            return Err(PorticoError::Validation("address is required".into()));
        }
        if !email.contains('@') {
            return Err(PorticoError::Validation(format!("invalid email: {}", email)));
        }
        if password.is_empty() {
            return Err(PorticoError::Validation("password is required".into()));
        }

        let hash = hash_password(password)?;
        let user = UserDoc::new(address.to_string(), email.to_string(), hash, enterprise);
        let view = user.view();
        self.users.insert_user(user).await?;

        info!(address = %address, enterprise, "Account created");
        Ok(view)
    }

    /// Check credentials and return the caller identity
    pub async fn sign_in(&self, address: &str, password: &str) -> Result<Identity> {
        let user = self.find(address).await?;
        if !user.account_enabled {
            return Err(PorticoError::Forbidden("account is disabled".into()));
        }
        if !verify_password(password, &user.password_hash)? {
            return Err(PorticoError::Forbidden("invalid credentials".into()));
        }
        Ok(self.identity_for(address))
    }

    pub async fn change_password(&self, address: &str, current: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(PorticoError::Validation("new password is required".into()));
        }
        let user = self.find(address).await?;
        if !verify_password(current, &user.password_hash)? {
            return Err(PorticoError::Forbidden("current password is incorrect".into()));
        }

        let new_hash = hash_password(new)?;
        self.update(address, |user| {
            user.password_hash = new_hash.clone();
            Ok(())
        })
        .await?;

        info!(address = %address, "Password changed");
        Ok(())
    }

    pub async fn set_account_enabled(&self, address: &str, enabled: bool) -> Result<()> {
        self.update(address, |user| {
            user.account_enabled = enabled;
            Ok(())
        })
        .await?;
        info!(address = %address, enabled, "Account enabled flag changed");
        Ok(())
    }

    pub async fn email_for(&self, address: &str) -> Result<String> {
        Ok(self.find(address).await?.email)
    }

    pub async fn authorized_networks(&self, address: &str) -> Result<Vec<String>> {
        Ok(self.find(address).await?.network_names)
    }

    /// Append a network grant, rejecting one the account already holds
    pub async fn grant_network(&self, address: &str, network: &str) -> Result<()> {
        self.update(address, |user| {
            if user.has_network(network) {
                return Err(PorticoError::AlreadyExists(format!(
                    "network {} already configured for user",
                    network
                )));
            }
            user.network_names.push(network.to_string());
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Record ownership of a keystore key as one `{name, id}` entry
    pub async fn grant_key(&self, address: &str, key_name: &str, key_id: &str) -> Result<()> {
        self.update(address, |user| {
            if user.owns_key(key_name) {
                return Err(PorticoError::AlreadyExists(format!(
                    "key {} already owned by user",
                    key_name
                )));
            }
            user.keys.push(OwnedKey {
                name: key_name.to_string(),
                id: key_id.to_string(),
            });
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::ErrorKind;

    async fn ledger_with_user() -> AccountLedger {
        let ledger = AccountLedger::new(Arc::new(MemoryStore::new()), "0xadmin");
        ledger
            .create_account("0xuser", "user@example.com", "hunter22", false)
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_sign_in_and_roles() {
        let ledger = ledger_with_user().await;
        ledger
            .create_account("0xadmin", "admin@example.com", "adminpw", true)
            .await
            .unwrap();

        let user = ledger.sign_in("0xuser", "hunter22").await.unwrap();
        assert!(!user.is_admin());
        let admin = ledger.sign_in("0xadmin", "adminpw").await.unwrap();
        assert!(admin.is_admin());

        let err = ledger.sign_in("0xuser", "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = ledger.sign_in("0xghost", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_sign_in() {
        let ledger = ledger_with_user().await;
        ledger.set_account_enabled("0xuser", false).await.unwrap();
        let err = ledger.sign_in("0xuser", "hunter22").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let ledger = ledger_with_user().await;
        let err = ledger
            .change_password("0xuser", "wrong", "new-pass")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        ledger
            .change_password("0xuser", "hunter22", "new-pass")
            .await
            .unwrap();
        assert!(ledger.sign_in("0xuser", "new-pass").await.is_ok());
        assert!(ledger.sign_in("0xuser", "hunter22").await.is_err());
    }

    #[tokio::test]
    async fn test_regrant_rejected_without_mutation() {
        let ledger = ledger_with_user().await;
        ledger.grant_network("0xuser", "alpha").await.unwrap();
        let before = ledger.find("0xuser").await.unwrap();

        let err = ledger.grant_network("0xuser", "alpha").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let after = ledger.find("0xuser").await.unwrap();
        assert_eq!(after.revision, before.revision);
        assert_eq!(after.network_names, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_grants_are_not_lost() {
        let ledger = ledger_with_user().await;
        let mut handles = Vec::new();
        for name in ["alpha", "beta", "gamma", "delta"] {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.grant_network("0xuser", name).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut networks = ledger.authorized_networks("0xuser").await.unwrap();
        networks.sort();
        assert_eq!(networks, vec!["alpha", "beta", "delta", "gamma"]);
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let ledger = ledger_with_user().await;
        let err = ledger
            .create_account("0xuser", "other@example.com", "pw", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            ledger.email_for("0xuser").await.unwrap(),
            "user@example.com"
        );
    }
}
