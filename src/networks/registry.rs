//! Hosted network registry and access control

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::address::validate_peer_address;
use crate::accounts::AccountLedger;
use crate::auth::Identity;
use crate::db::schemas::{NetworkDoc, NetworkView, PeerPair};
use crate::store::NetworkStore;
use crate::types::{PorticoError, Result};

/// Administrative request to register a hosted network
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterNetwork {
    pub name: String,
    pub api_url: String,
    pub swarm_key: String,
    #[serde(default)]
    pub local_node_addresses: Vec<String>,
    #[serde(default)]
    pub bootstrap_peer_addresses: Vec<String>,
    /// Users to grant; empty means the registering admin only
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Clone)]
pub struct NetworkRegistry {
    networks: Arc<dyn NetworkStore>,
    accounts: AccountLedger,
}

impl NetworkRegistry {
    pub fn new(networks: Arc<dyn NetworkStore>, accounts: AccountLedger) -> Self {
        Self { networks, accounts }
    }

    pub async fn resolve_network(&self, name: &str) -> Result<NetworkDoc> {
        self.networks
            .find_network(name)
            .await?
            .ok_or_else(|| PorticoError::NotFound(format!("network {} not found", name)))
    }

    pub async fn register_network(
        &self,
        admin: &Identity,
        request: RegisterNetwork,
    ) -> Result<NetworkView> {
        admin.require_admin()?;

        if request.name.trim().is_empty() {
            return Err(PorticoError::Validation("network name is required".into()));
        }
        reqwest::Url::parse(&request.api_url).map_err(|e| {
            PorticoError::Validation(format!("invalid api_url {}: {}", request.api_url, e))
        })?;
        if request.local_node_addresses.len() != request.bootstrap_peer_addresses.len() {
            return Err(PorticoError::Validation(format!(
                "local_node_addresses ({}) and bootstrap_peer_addresses ({}) must be equal in length",
                request.local_node_addresses.len(),
                request.bootstrap_peer_addresses.len()
            )));
        }

        let mut peers = Vec::with_capacity(request.local_node_addresses.len());
        for (local, bootstrap) in request
            .local_node_addresses
            .iter()
            .zip(&request.bootstrap_peer_addresses)
        {
            validate_peer_address(bootstrap)?;
            validate_peer_address(local)?;
            peers.push(PeerPair {
                local_node_address: local.clone(),
                bootstrap_peer_address: bootstrap.clone(),
            });
        }

        let mut grantees: Vec<String> = Vec::new();
        if request.users.is_empty() {
            grantees.push(admin.address.clone());
        } else {
            for user in &request.users {
                if !grantees.contains(user) {
                    grantees.push(user.clone());
                }
            }
        }

        // Named grantees must exist before the network does
        let mut ledger_grantees = Vec::with_capacity(grantees.len());
        for address in &grantees {
            match self.accounts.find(address).await {
                Ok(_) => ledger_grantees.push(address.clone()),
                Err(PorticoError::NotFound(_)) if *address == admin.address => {
                    debug!(admin = %address, "Admin has no account, grant kept on network only");
                }
                Err(e) => return Err(e),
            }
        }

        let mut network = NetworkDoc::new(
            request.name.clone(),
            request.api_url,
            request.swarm_key,
            peers,
        );
        network.authorized_users = grantees;
        let view = network.view();
        self.networks.insert_network(network).await?;

        for address in &ledger_grantees {
            self.accounts.grant_network(address, &request.name).await?;
        }

        info!(
            network = %request.name,
            peers = view.local_node_addresses.len(),
            grantees = view.authorized_users.len(),
            "Hosted network registered"
        );
        Ok(view)
    }

    /// Administrative view of a network, without its swarm key
    pub async fn get_network(&self, admin: &Identity, name: &str) -> Result<NetworkView> {
        admin.require_admin()?;
        Ok(self.resolve_network(name).await?.view())
    }

    /// Grant `user` access to an existing network.
    ///
    /// The network side is written first and is idempotent, so a retry after
    /// a partial failure still lands the user in `authorized_users`. Fails
    /// `AlreadyExists` when the account already holds the grant.
    pub async fn grant_network(&self, admin: &Identity, user: &str, network: &str) -> Result<()> {
        admin.require_admin()?;
        self.resolve_network(network).await?;
        self.accounts.find(user).await?;

        self.networks.add_authorized_user(network, user).await?;
        self.accounts.grant_network(user, network).await?;

        info!(network = %network, user = %user, "Network access granted");
        Ok(())
    }

    /// Resolve `network` and check the caller may operate on it.
    ///
    /// Admins pass unconditionally; everyone else needs an enabled account
    /// holding a grant for the network.
    pub async fn authorize(&self, caller: &Identity, network: &str) -> Result<NetworkDoc> {
        let descriptor = self.resolve_network(network).await?;
        if caller.is_admin() {
            return Ok(descriptor);
        }

        let denied = || {
            PorticoError::Forbidden(format!(
                "{} is not authorized for network {}",
                caller.address, network
            ))
        };
        let user = match self.accounts.find(&caller.address).await {
            Ok(user) => user,
            Err(PorticoError::NotFound(_)) => return Err(denied()),
            Err(e) => return Err(e),
        };
        if !user.account_enabled || !user.has_network(network) {
            return Err(denied());
        }
        Ok(descriptor)
    }
}
