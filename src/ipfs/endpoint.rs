//! Storage endpoint capability
//!
//! One [`StorageEndpoint`] is bound to a single hosted network's IPFS HTTP
//! API. Calls never retry; a transport failure is the caller's failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::db::schemas::NetworkDoc;
use crate::types::Result;

/// Streamed object contents
pub type ContentStream = BoxStream<'static, Result<Bytes>>;

/// Messages arriving on a pubsub subscription
pub type MessageStream = BoxStream<'static, Result<PubsubMessage>>;

/// DAG node statistics as reported by `object/stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectStat {
    pub hash: String,
    #[serde(default)]
    pub num_links: u64,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub links_size: u64,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub cumulative_size: u64,
}

/// One entry of the endpoint's local pin set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinInfo {
    pub hash: String,
    pub pin_type: String,
}

/// A key held in the endpoint's keystore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Id")]
    pub id: String,
}

/// Parameters of an IPNS publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPublish {
    pub content_hash: String,
    pub key_name: String,
    pub lifetime: Duration,
    pub ttl: Duration,
    pub resolve: bool,
}

/// Result of an IPNS publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A decoded pubsub message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsubMessage {
    pub from: String,
    pub data: Bytes,
    pub seqno: String,
    pub topics: Vec<String>,
}

/// Operations against one hosted network's endpoint
#[async_trait]
pub trait StorageEndpoint: Send + Sync {
    /// Add content and return its hash
    async fn add(&self, data: Bytes) -> Result<String>;

    /// Stream the contents of `hash`
    async fn cat(&self, hash: &str) -> Result<ContentStream>;

    async fn object_stat(&self, key: &str) -> Result<ObjectStat>;

    /// Cumulative size of the DAG rooted at `hash`, in bytes.
    ///
    /// Includes UnixFS and protobuf framing, so it is larger than what
    /// [`cat`](Self::cat) streams.
    async fn object_size(&self, hash: &str) -> Result<u64> {
        Ok(self.object_stat(hash).await?.cumulative_size)
    }

    /// Byte length of the file `hash`, exactly as `cat` streams it
    async fn file_size(&self, hash: &str) -> Result<u64>;

    /// Recursive pins held by this endpoint's node. Unpaginated.
    async fn local_pins(&self) -> Result<Vec<PinInfo>>;

    /// Whether `hash` is in the local pin set; absence is `false`, not an error
    async fn is_pinned(&self, hash: &str) -> Result<bool> {
        Ok(self.local_pins().await?.iter().any(|p| p.hash == hash))
    }

    /// Publish an IPNS record; fails `KeyNotFound` when the keystore lacks the key
    async fn publish_record(&self, request: &RecordPublish) -> Result<PublishedRecord>;

    async fn list_keys(&self) -> Result<Vec<KeyInfo>>;

    /// Generate a new ed25519 key in the keystore
    async fn generate_key(&self, name: &str) -> Result<KeyInfo>;

    async fn pubsub_publish(&self, topic: &str, message: &str) -> Result<()>;

    /// Open a subscription; the stream ends when the endpoint closes it
    async fn pubsub_subscribe(&self, topic: &str) -> Result<MessageStream>;
}

/// Builds an endpoint client for a resolved network
pub trait EndpointConnector: Send + Sync {
    fn connect(&self, network: &NetworkDoc) -> Result<Arc<dyn StorageEndpoint>>;
}
