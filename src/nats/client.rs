//! NATS JetStream client wrapper
//!
//! Connection management plus durable, acknowledged publishes onto the
//! request stream.

use async_nats::jetstream::{self, stream::Stream};
use async_nats::{Client, ConnectOptions, HeaderMap};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NatsArgs;
use crate::nats::messages::SUBJECT_PREFIX;
use crate::types::PorticoError;

/// Default time to wait for a JetStream ack
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// How long queued requests are retained on the stream
const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    ack_timeout: Duration,
    stream_name: String,
}

impl NatsClient {
    /// Connect to NATS
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self, PorticoError> {
        info!(url = %args.nats_url, "Connecting to NATS");

        // Fail fast when NATS is down at startup; reconnects still happen later
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| PorticoError::Nats(format!("Failed to connect: {}", e)))?;

        info!(url = %args.nats_url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            stream_name: args.nats_stream.clone(),
        })
    }

    /// Set how long a publish waits for the broker's ack
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Ensure the file-backed request stream exists
    pub async fn ensure_stream(&self) -> Result<Stream, PorticoError> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![format!("{}.>", SUBJECT_PREFIX)],
                max_age: STREAM_MAX_AGE,
                storage: jetstream::stream::StorageType::File,
                duplicate_window: Duration::from_secs(120),
                ..Default::default()
            })
            .await
            .map_err(|e| PorticoError::Nats(format!("Failed to create stream: {}", e)))?;

        info!(stream = %self.stream_name, "Using stream for request messages");
        Ok(stream)
    }

    /// Publish onto the stream and wait for the broker to persist it.
    ///
    /// `message_id` is sent as `Nats-Msg-Id` so the broker drops a resend
    /// that lands inside the duplicate window.
    pub async fn publish_durable(
        &self,
        subject: &str,
        message_id: &str,
        payload: Bytes,
    ) -> Result<(), PorticoError> {
        let mut headers = HeaderMap::new();
        headers.insert(async_nats::header::NATS_MESSAGE_ID, message_id);

        let publish = async {
            self.jetstream
                .publish_with_headers(subject.to_string(), headers, payload)
                .await
                .map_err(|e| PorticoError::Nats(format!("Failed to publish: {}", e)))?
                .await
                .map_err(|e| PorticoError::Nats(format!("Failed to confirm publish: {}", e)))
        };

        let ack = tokio::time::timeout(self.ack_timeout, publish)
            .await
            .map_err(|_| {
                PorticoError::Nats(format!(
                    "No ack for {} within {}ms",
                    subject,
                    self.ack_timeout.as_millis()
                ))
            })??;

        if ack.duplicate {
            warn!(subject = %subject, message_id = %message_id, "Broker reported duplicate message");
        } else {
            debug!(subject = %subject, sequence = ack.sequence, "Message persisted");
        }
        Ok(())
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<(), PorticoError> {
        self.client
            .flush()
            .await
            .map_err(|e| PorticoError::Nats(format!("Flush failed: {}", e)))
    }
}
