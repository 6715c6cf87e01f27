//! Request dispatcher
//!
//! Turns an authorized request into exactly one durable message on the
//! subject for its operation kind. The call returns once the broker has
//! acknowledged the message; a failed enqueue fails the request with no
//! local retry. Delivery is at-least-once with no ordering between
//! messages, so consumers deduplicate on `request_id`.

mod publisher;

pub use publisher::{
    LoggingPublisher, MessagePublisher, NatsPublisher, RecordedMessage, RecordingPublisher,
};

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::nats::{Envelope, Exchange, QueueMessage};
use crate::types::{PorticoError, Result};

/// Proof that a message was accepted by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    pub request_id: String,
    pub exchange: Exchange,
}

#[derive(Clone)]
pub struct Dispatcher {
    publisher: Arc<dyn MessagePublisher>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    /// Publish `message` on its exchange and wait for the broker ack.
    ///
    /// Any failure surfaces as `PorticoError::Publish` with nothing marked
    /// completed; callers attach their own completed effects.
    pub async fn enqueue<M: QueueMessage>(&self, message: M) -> Result<DispatchReceipt> {
        let envelope = Envelope::new(message);
        let subject = M::EXCHANGE.subject();
        let payload = serde_json::to_vec(&envelope).map_err(|e| PorticoError::Publish {
            message: format!("failed to encode {} message: {}", M::EXCHANGE, e),
            completed: None,
        })?;

        if let Err(e) = self
            .publisher
            .publish(&subject, &envelope.request_id, Bytes::from(payload))
            .await
        {
            error!(
                exchange = %M::EXCHANGE,
                request_id = %envelope.request_id,
                error = %e,
                "Enqueue failed"
            );
            return Err(PorticoError::Publish {
                message: e.to_string(),
                completed: None,
            });
        }

        info!(
            exchange = %M::EXCHANGE,
            request_id = %envelope.request_id,
            "Request enqueued"
        );
        Ok(DispatchReceipt {
            request_id: envelope.request_id,
            exchange: M::EXCHANGE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::{FileAdd, PinRequest};
    use crate::types::ErrorKind;

    fn pin() -> PinRequest {
        PinRequest {
            content_hash: "QmHash".into(),
            network_name: "alpha".into(),
            caller_address: "0xuser".into(),
            hold_months: 1,
        }
    }

    #[tokio::test]
    async fn test_enqueue_routes_by_kind() {
        let recorder = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(recorder.clone());

        let receipt = dispatcher.enqueue(pin()).await.unwrap();
        assert_eq!(receipt.exchange, Exchange::Pin);
        dispatcher
            .enqueue(FileAdd {
                content_hash: "QmFile".into(),
                network_name: "alpha".into(),
                uploader_address: "0xuser".into(),
                hold_months: 2,
            })
            .await
            .unwrap();

        let sent = recorder.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "portico.requests.pin");
        assert_eq!(sent[0].message_id, receipt.request_id);
        assert_eq!(sent[0].payload["request_id"], receipt.request_id.as_str());
        assert_eq!(sent[1].subject, "portico.requests.file_add");
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_publish_error() {
        let recorder = Arc::new(RecordingPublisher::new());
        recorder.set_failing(true);
        let dispatcher = Dispatcher::new(recorder.clone());

        let err = dispatcher.enqueue(pin()).await.unwrap_err();
        assert!(matches!(err, PorticoError::Publish { completed: None, .. }));
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert!(recorder.messages().is_empty());
    }
}
