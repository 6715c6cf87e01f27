//! Gateway facade
//!
//! One entry point per caller-facing operation. Each operation validates
//! its input before touching the network, authorizes the caller against
//! the target network, then runs its steps strictly in sequence.

use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accounts::AccountLedger;
use crate::auth::Identity;
use crate::db::schemas::{NamingRecordDoc, NetworkView, OwnedKey, UserView};
use crate::dispatch::{DispatchReceipt, Dispatcher, MessagePublisher};
use crate::ipfs::{ContentStream, EndpointConnector, ObjectStat, PinInfo};
use crate::keys::KeyCustody;
use crate::naming::{NamingRecordPublisher, NamingRecordRequest, PublishedNamingRecord};
use crate::nats::{FileAdd, PinRemoval, PinRequest};
use crate::networks::{NetworkRegistry, RegisterNetwork};
use crate::pubsub::{PubsubRelay, SubscriptionInfo};
use crate::store::{NamingRecordStore, NetworkStore, UserStore};
use crate::types::{CompletedEffect, PorticoError, Result};

/// Content type used when a download does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Result of adding a file to a network
#[derive(Debug, Clone, Serialize)]
pub struct AddedFile {
    pub content_hash: String,
    pub request_id: String,
}

/// A download ready to be streamed to the caller
pub struct Download {
    pub content_type: String,
    /// Byte length of the streamed file, known before the first byte is sent
    pub size: u64,
    pub headers: Vec<(String, String)>,
    pub body: ContentStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Gateway {
    accounts: AccountLedger,
    registry: NetworkRegistry,
    custody: KeyCustody,
    connector: Arc<dyn EndpointConnector>,
    dispatcher: Dispatcher,
    naming: NamingRecordPublisher,
    relay: PubsubRelay,
}

impl Gateway {
    pub fn new(
        networks: Arc<dyn NetworkStore>,
        users: Arc<dyn UserStore>,
        records: Arc<dyn NamingRecordStore>,
        connector: Arc<dyn EndpointConnector>,
        publisher: Arc<dyn MessagePublisher>,
        admin_address: &str,
    ) -> Self {
        let accounts = AccountLedger::new(users, admin_address);
        let registry = NetworkRegistry::new(networks, accounts.clone());
        let custody = KeyCustody::new(accounts.clone());
        let dispatcher = Dispatcher::new(publisher);
        let naming = NamingRecordPublisher::new(
            registry.clone(),
            custody.clone(),
            connector.clone(),
            records,
            dispatcher.clone(),
        );
        let relay = PubsubRelay::new(registry.clone(), connector.clone());

        Self {
            accounts,
            registry,
            custody,
            connector,
            dispatcher,
            naming,
            relay,
        }
    }

    /// Build a gateway whose three stores are backed by one value
    pub fn with_store<S>(
        store: Arc<S>,
        connector: Arc<dyn EndpointConnector>,
        publisher: Arc<dyn MessagePublisher>,
        admin_address: &str,
    ) -> Self
    where
        S: NetworkStore + UserStore + NamingRecordStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store,
            connector,
            publisher,
            admin_address,
        )
    }

    pub fn accounts(&self) -> &AccountLedger {
        &self.accounts
    }

    // ---- accounts ----

    pub async fn create_account(
        &self,
        address: &str,
        email: &str,
        password: &str,
        enterprise: bool,
    ) -> Result<UserView> {
        self.accounts
            .create_account(address, email, password, enterprise)
            .await
    }

    pub async fn sign_in(&self, address: &str, password: &str) -> Result<Identity> {
        self.accounts.sign_in(address, password).await
    }

    pub async fn change_password(&self, caller: &Identity, current: &str, new: &str) -> Result<()> {
        self.accounts
            .change_password(&caller.address, current, new)
            .await
    }

    pub async fn set_account_enabled(
        &self,
        caller: &Identity,
        address: &str,
        enabled: bool,
    ) -> Result<()> {
        caller.require_admin()?;
        self.accounts.set_account_enabled(address, enabled).await
    }

    pub async fn email_for(&self, caller: &Identity) -> Result<String> {
        self.accounts.email_for(&caller.address).await
    }

    pub async fn authorized_networks(&self, caller: &Identity) -> Result<Vec<String>> {
        self.accounts.authorized_networks(&caller.address).await
    }

    // ---- networks ----

    pub async fn register_network(
        &self,
        caller: &Identity,
        request: RegisterNetwork,
    ) -> Result<NetworkView> {
        self.registry.register_network(caller, request).await
    }

    pub async fn get_network(&self, caller: &Identity, name: &str) -> Result<NetworkView> {
        self.registry.get_network(caller, name).await
    }

    pub async fn grant_network(&self, caller: &Identity, user: &str, network: &str) -> Result<()> {
        self.registry.grant_network(caller, user, network).await
    }

    // ---- content ----

    /// Queue a pin of `hash` on `network` for `hold_months`
    pub async fn pin(
        &self,
        caller: &Identity,
        network: &str,
        hash: &str,
        hold_months: u32,
    ) -> Result<DispatchReceipt> {
        validate_cid(hash)?;
        validate_hold(hold_months)?;
        self.registry.authorize(caller, network).await?;

        self.dispatcher
            .enqueue(PinRequest {
                content_hash: hash.to_string(),
                network_name: network.to_string(),
                caller_address: caller.address.clone(),
                hold_months,
            })
            .await
    }

    /// Queue removal of a pin. Administrative.
    pub async fn remove_pin(
        &self,
        caller: &Identity,
        network: &str,
        hash: &str,
    ) -> Result<DispatchReceipt> {
        caller.require_admin()?;
        validate_cid(hash)?;
        self.registry.resolve_network(network).await?;

        self.dispatcher
            .enqueue(PinRemoval {
                content_hash: hash.to_string(),
                network_name: network.to_string(),
                caller_address: caller.address.clone(),
            })
            .await
    }

    /// Add `data` to the network, then queue the file bookkeeping.
    ///
    /// The content stays on the endpoint when the enqueue fails; the error
    /// then reports it as a completed effect.
    pub async fn add_file(
        &self,
        caller: &Identity,
        network: &str,
        data: Bytes,
        hold_months: u32,
    ) -> Result<AddedFile> {
        if data.is_empty() {
            return Err(PorticoError::Validation("file is empty".into()));
        }
        validate_hold(hold_months)?;
        let descriptor = self.registry.authorize(caller, network).await?;
        let endpoint = self.connector.connect(&descriptor)?;

        let size = data.len();
        let content_hash = endpoint.add(data).await?;
        info!(network = %network, hash = %content_hash, size, "File added");

        let receipt = self
            .dispatcher
            .enqueue(FileAdd {
                content_hash: content_hash.clone(),
                network_name: network.to_string(),
                uploader_address: caller.address.clone(),
                hold_months,
            })
            .await
            .map_err(|e| {
                e.with_completed(CompletedEffect::ContentAdded {
                    content_hash: content_hash.clone(),
                })
            })?;

        Ok(AddedFile {
            content_hash,
            request_id: receipt.request_id,
        })
    }

    pub async fn object_size(&self, caller: &Identity, network: &str, hash: &str) -> Result<u64> {
        validate_cid(hash)?;
        let descriptor = self.registry.authorize(caller, network).await?;
        self.connector.connect(&descriptor)?.object_size(hash).await
    }

    /// DAG statistics for `key`, which may be a bare hash or an IPFS path
    pub async fn object_stat(
        &self,
        caller: &Identity,
        network: &str,
        key: &str,
    ) -> Result<ObjectStat> {
        if key.trim().is_empty() {
            return Err(PorticoError::Validation("key is required".into()));
        }
        let descriptor = self.registry.authorize(caller, network).await?;
        self.connector.connect(&descriptor)?.object_stat(key).await
    }

    pub async fn local_pins(&self, caller: &Identity, network: &str) -> Result<Vec<PinInfo>> {
        let descriptor = self.registry.authorize(caller, network).await?;
        self.connector.connect(&descriptor)?.local_pins().await
    }

    pub async fn check_local_pin(
        &self,
        caller: &Identity,
        network: &str,
        hash: &str,
    ) -> Result<bool> {
        validate_cid(hash)?;
        let descriptor = self.registry.authorize(caller, network).await?;
        self.connector.connect(&descriptor)?.is_pinned(hash).await
    }

    /// Prepare a streamed download of `hash`.
    ///
    /// `extra_headers` is a flat name/value list and only takes effect for
    /// the administrator.
    pub async fn download(
        &self,
        caller: &Identity,
        network: &str,
        hash: &str,
        content_type: Option<&str>,
        extra_headers: Vec<String>,
    ) -> Result<Download> {
        validate_cid(hash)?;
        let headers = if caller.is_admin() {
            header_pairs(extra_headers)?
        } else {
            if !extra_headers.is_empty() {
                debug!(caller = %caller.address, "Ignoring extra download headers from non-admin");
            }
            Vec::new()
        };
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let descriptor = self.registry.authorize(caller, network).await?;
        let endpoint = self.connector.connect(&descriptor)?;
        let size = endpoint.file_size(hash).await?;
        let body = endpoint.cat(hash).await?;

        debug!(network = %network, hash = %hash, size, "Download started");
        Ok(Download {
            content_type,
            size,
            headers,
            body,
        })
    }

    // ---- keys ----

    /// Generate a key in the network's keystore owned by the caller
    pub async fn create_key(
        &self,
        caller: &Identity,
        network: &str,
        key_name: &str,
    ) -> Result<OwnedKey> {
        let descriptor = self.registry.authorize(caller, network).await?;
        let endpoint = self.connector.connect(&descriptor)?;
        let key = self
            .custody
            .create_key(&caller.address, endpoint.as_ref(), key_name)
            .await?;
        info!(network = %network, key = %key.name, owner = %caller.address, "Key created");
        Ok(key)
    }

    pub async fn list_keys(&self, caller: &Identity) -> Result<Vec<OwnedKey>> {
        self.custody.list_keys(&caller.address).await
    }

    // ---- naming records ----

    pub async fn publish_naming_record(
        &self,
        caller: &Identity,
        request: NamingRecordRequest,
    ) -> Result<PublishedNamingRecord> {
        self.naming.publish(caller, request).await
    }

    pub async fn naming_record(
        &self,
        caller: &Identity,
        record_name: &str,
    ) -> Result<NamingRecordDoc> {
        self.naming.lookup(caller, record_name).await
    }

    // ---- pubsub ----

    pub async fn pubsub_publish(
        &self,
        caller: &Identity,
        network: &str,
        topic: &str,
        message: &str,
    ) -> Result<()> {
        self.relay.publish(caller, network, topic, message).await
    }

    pub async fn pubsub_subscribe(
        &self,
        caller: &Identity,
        network: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo> {
        self.relay.subscribe(caller, network, topic).await
    }

    pub async fn pubsub_unsubscribe(
        &self,
        caller: &Identity,
        network: &str,
        topic: &str,
    ) -> Result<()> {
        self.relay.unsubscribe(caller, network, topic).await
    }

    pub fn pubsub_subscriptions(&self, caller: &Identity) -> Result<Vec<SubscriptionInfo>> {
        caller.require_admin()?;
        Ok(self.relay.subscriptions())
    }

    /// Stop every background subscription
    pub async fn shutdown(&self) {
        let stopped = self.relay.shutdown().await;
        if stopped > 0 {
            warn!(stopped, "Background subscriptions cancelled on shutdown");
        }
    }
}

fn validate_cid(hash: &str) -> Result<()> {
    if hash.trim().is_empty() {
        return Err(PorticoError::Validation("hash is required".into()));
    }
    Cid::try_from(hash)
        .map(|_| ())
        .map_err(|e| PorticoError::Validation(format!("invalid content hash {}: {}", hash, e)))
}

fn validate_hold(hold_months: u32) -> Result<()> {
    if hold_months == 0 {
        return Err(PorticoError::Validation(
            "hold_months must be a positive integer".into(),
        ));
    }
    Ok(())
}

/// Pair up a flat `[name, value, name, value, ...]` list
fn header_pairs(flat: Vec<String>) -> Result<Vec<(String, String)>> {
    if flat.len() % 2 != 0 {
        return Err(PorticoError::Validation(
            "extra headers must come in name/value pairs".into(),
        ));
    }
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((name, value));
    }
    Ok(pairs)
}
