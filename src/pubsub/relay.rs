//! Pubsub relay
//!
//! Publishing is a synchronous passthrough. Subscribing starts a background
//! consumer per (network, topic) that logs what it receives. Every consumer
//! is tracked here with its own cancellation token so it can be stopped
//! individually or all at once on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::Identity;
use crate::db::schemas::NetworkDoc;
use crate::ipfs::EndpointConnector;
use crate::networks::NetworkRegistry;
use crate::types::{PorticoError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubscriptionKey {
    network: String,
    topic: String,
}

struct Subscription {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: DateTime<Utc>,
    messages_seen: Arc<AtomicU64>,
}

/// A running subscription as reported to administrators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub network: String,
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub messages_seen: u64,
}

#[derive(Clone)]
pub struct PubsubRelay {
    registry: NetworkRegistry,
    connector: Arc<dyn EndpointConnector>,
    subscriptions: Arc<DashMap<SubscriptionKey, Subscription>>,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl PubsubRelay {
    pub fn new(registry: NetworkRegistry, connector: Arc<dyn EndpointConnector>) -> Self {
        Self {
            registry,
            connector,
            subscriptions: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish `message` on `topic` of a network the caller may use
    pub async fn publish(
        &self,
        caller: &Identity,
        network: &str,
        topic: &str,
        message: &str,
    ) -> Result<()> {
        require_topic(topic)?;
        if message.is_empty() {
            return Err(PorticoError::Validation("message is required".into()));
        }

        let descriptor = self.registry.authorize(caller, network).await?;
        let endpoint = self.connector.connect(&descriptor)?;
        endpoint.pubsub_publish(topic, message).await?;

        debug!(network = %network, topic = %topic, "Pubsub message published");
        Ok(())
    }

    /// Start consuming `topic` in the background.
    ///
    /// Returns as soon as the consumer is spawned. Fails `AlreadyExists`
    /// while another consumer for the same pair is still running.
    pub async fn subscribe(
        &self,
        caller: &Identity,
        network: &str,
        topic: &str,
    ) -> Result<SubscriptionInfo> {
        caller.require_admin()?;
        require_topic(topic)?;
        if self.shutdown.is_cancelled() {
            return Err(PorticoError::Internal("relay is shutting down".into()));
        }
        let descriptor = self.registry.resolve_network(network).await?;

        let key = SubscriptionKey {
            network: network.to_string(),
            topic: topic.to_string(),
        };
        let info = match self.subscriptions.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().handle.is_finished() {
                    return Err(PorticoError::AlreadyExists(format!(
                        "already subscribed to {} on {}",
                        topic, network
                    )));
                }
                let subscription = self.spawn_consumer(key.clone(), descriptor);
                let info = describe(&key, &subscription);
                occupied.insert(subscription);
                info
            }
            Entry::Vacant(vacant) => {
                let subscription = self.spawn_consumer(key.clone(), descriptor);
                let info = describe(&key, &subscription);
                vacant.insert(subscription);
                info
            }
        };

        info!(network = %network, topic = %topic, "Pubsub subscription started");
        Ok(info)
    }

    /// Stop one subscription and wait for its consumer to exit
    pub async fn unsubscribe(&self, caller: &Identity, network: &str, topic: &str) -> Result<()> {
        caller.require_admin()?;
        let key = SubscriptionKey {
            network: network.to_string(),
            topic: topic.to_string(),
        };
        let (_, subscription) = self.subscriptions.remove(&key).ok_or_else(|| {
            PorticoError::NotFound(format!("no subscription to {} on {}", topic, network))
        })?;

        subscription.cancel.cancel();
        if let Err(e) = subscription.handle.await {
            warn!(network = %network, topic = %topic, error = %e, "Consumer task ended abnormally");
        }
        info!(network = %network, topic = %topic, "Pubsub subscription stopped");
        Ok(())
    }

    /// Running subscriptions, sorted by network then topic
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut running: Vec<SubscriptionInfo> = self
            .subscriptions
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .map(|entry| describe(entry.key(), entry.value()))
            .collect();
        running.sort_by(|a, b| (&a.network, &a.topic).cmp(&(&b.network, &b.topic)));
        running
    }

    /// Cancel every consumer and wait for all of them to exit.
    ///
    /// Returns the number of consumers stopped.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();

        let keys: Vec<SubscriptionKey> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut stopped = 0;
        for key in keys {
            if let Some((_, subscription)) = self.subscriptions.remove(&key) {
                subscription.cancel.cancel();
                if let Err(e) = subscription.handle.await {
                    warn!(network = %key.network, topic = %key.topic, error = %e, "Consumer task ended abnormally");
                }
                stopped += 1;
            }
        }

        info!(stopped, "Pubsub relay shut down");
        stopped
    }

    fn spawn_consumer(&self, key: SubscriptionKey, network: NetworkDoc) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = self.shutdown.child_token();
        let messages_seen = Arc::new(AtomicU64::new(0));

        let consumer = Consumer {
            connector: self.connector.clone(),
            network,
            topic: key.topic.clone(),
            cancel: cancel.clone(),
            messages_seen: messages_seen.clone(),
        };
        let subscriptions = self.subscriptions.clone();
        let handle = tokio::spawn(async move {
            consumer.run().await;
            // Leave a replacement registered under the same key alone
            subscriptions.remove_if(&key, |_, s| s.id == id);
        });

        Subscription {
            id,
            cancel,
            handle,
            started_at: Utc::now(),
            messages_seen,
        }
    }
}

fn describe(key: &SubscriptionKey, subscription: &Subscription) -> SubscriptionInfo {
    SubscriptionInfo {
        network: key.network.clone(),
        topic: key.topic.clone(),
        started_at: subscription.started_at,
        messages_seen: subscription.messages_seen.load(Ordering::SeqCst),
    }
}

fn require_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(PorticoError::Validation("topic is required".into()));
    }
    Ok(())
}

/// Background loop for one subscription
struct Consumer {
    connector: Arc<dyn EndpointConnector>,
    network: NetworkDoc,
    topic: String,
    cancel: CancellationToken,
    messages_seen: Arc<AtomicU64>,
}

impl Consumer {
    async fn run(self) {
        let network = self.network.name.clone();
        let endpoint = match self.connector.connect(&self.network) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!(network = %network, topic = %self.topic, error = %e, "Cannot reach endpoint");
                return;
            }
        };

        let mut messages = tokio::select! {
            _ = self.cancel.cancelled() => return,
            opened = endpoint.pubsub_subscribe(&self.topic) => match opened {
                Ok(stream) => stream,
                Err(e) => {
                    error!(network = %network, topic = %self.topic, error = %e, "Subscribe failed");
                    return;
                }
            },
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(network = %network, topic = %self.topic, "Consumer cancelled");
                    break;
                }
                next = messages.next() => match next {
                    Some(Ok(message)) => {
                        let seen = self.messages_seen.fetch_add(1, Ordering::SeqCst) + 1;
                        info!(
                            network = %network,
                            topic = %self.topic,
                            from = %message.from,
                            seqno = %message.seqno,
                            seen,
                            data = %String::from_utf8_lossy(&message.data),
                            "Pubsub message received"
                        );
                    }
                    Some(Err(e)) => {
                        warn!(network = %network, topic = %self.topic, error = %e, "Subscription failed");
                        break;
                    }
                    None => {
                        info!(network = %network, topic = %self.topic, "Subscription closed by endpoint");
                        break;
                    }
                },
            }
        }
    }
}
