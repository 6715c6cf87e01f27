//! Messaging substrate implementations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::nats::NatsClient;
use crate::types::{PorticoError, Result};

/// Durable publish with broker acknowledgement
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, subject: &str, message_id: &str, payload: Bytes) -> Result<()>;
}

/// Publishes onto the JetStream request stream
pub struct NatsPublisher {
    client: NatsClient,
}

impl NatsPublisher {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessagePublisher for NatsPublisher {
    async fn publish(&self, subject: &str, message_id: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_durable(subject, message_id, payload)
            .await
    }
}

/// Dev-mode publisher that only logs what would have been sent
#[derive(Default)]
pub struct LoggingPublisher;

#[async_trait]
impl MessagePublisher for LoggingPublisher {
    async fn publish(&self, subject: &str, message_id: &str, payload: Bytes) -> Result<()> {
        info!(
            subject = %subject,
            message_id = %message_id,
            bytes = payload.len(),
            "Dev mode: message not sent to a broker"
        );
        Ok(())
    }
}

/// A message captured by [`RecordingPublisher`]
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub subject: String,
    pub message_id: String,
    pub payload: serde_json::Value,
}

/// Test publisher that keeps every message and can be told to fail
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<RecordedMessage>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail as if the broker never acked
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn messages_on(&self, subject: &str) -> Vec<RecordedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.subject == subject)
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, subject: &str, message_id: &str, payload: Bytes) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PorticoError::Nats(format!("no ack for {}", subject)));
        }
        let payload = serde_json::from_slice(&payload)
            .map_err(|e| PorticoError::Internal(format!("unreadable payload: {}", e)))?;

        let mut messages = self
            .messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        messages.push(RecordedMessage {
            subject: subject.to_string(),
            message_id: message_id.to_string(),
            payload,
        });
        Ok(())
    }
}
