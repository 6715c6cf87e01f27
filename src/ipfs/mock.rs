//! In-process storage endpoint for tests and dev mode.
//!
//! Keeps content, pins and keys in memory, counts every call, and loops
//! pubsub publishes back to subscribers.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use cid::multihash::Multihash;
use cid::Cid;
use tokio::sync::broadcast;

use super::endpoint::{
    ContentStream, EndpointConnector, KeyInfo, MessageStream, ObjectStat, PinInfo,
    PublishedRecord, PubsubMessage, RecordPublish, StorageEndpoint,
};
use crate::db::schemas::NetworkDoc;
use crate::types::{PorticoError, Result};

/// Multicodec for raw binary content
const RAW_CODEC: u64 = 0x55;
/// Multihash code for the identity "hash"
const IDENTITY_HASH: u64 = 0x00;
/// UnixFS plus dag-pb wrapping around a small single-block file
const UNIXFS_FRAMING: u64 = 8;

#[derive(Default)]
struct MockState {
    contents: HashMap<String, Bytes>,
    pins: BTreeSet<String>,
    keys: Vec<KeyInfo>,
    published: Vec<RecordPublish>,
    calls: Vec<&'static str>,
}

/// Mock storage endpoint
pub struct MockEndpoint {
    state: Mutex<MockState>,
    call_count: AtomicU32,
    unreachable: AtomicBool,
    pubsub: broadcast::Sender<(String, Bytes)>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        let (pubsub, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState::default()),
            call_count: AtomicU32::new(0),
            unreachable: AtomicBool::new(false),
            pubsub,
        }
    }

    /// Seed a key into the keystore
    pub fn with_key(self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.lock().keys.push(KeyInfo {
            name: name.into(),
            id: id.into(),
        });
        self
    }

    /// Make every subsequent call fail as if the endpoint were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Total number of calls made against this endpoint
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of calls made to one operation, e.g. `"publish_record"`
    pub fn calls_to(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    /// IPNS publishes received so far
    pub fn published_records(&self) -> Vec<RecordPublish> {
        self.lock().published.clone()
    }

    /// Deliver a message to current subscribers of `topic`
    pub fn emit(&self, topic: &str, data: impl Into<Bytes>) {
        let _ = self.pubsub.send((topic.to_string(), data.into()));
    }

    /// Number of open pubsub subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.pubsub.receiver_count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.lock().calls.push(operation);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PorticoError::Endpoint("connection refused".into()));
        }
        Ok(())
    }

    fn store(&self, data: Bytes) -> String {
        let mut state = self.lock();
        let label = format!("mock-content-{}", state.contents.len());
        let hash = Multihash::<64>::wrap(IDENTITY_HASH, label.as_bytes())
            .map(|mh| Cid::new_v1(RAW_CODEC, mh).to_string())
            .unwrap_or(label);
        state.contents.insert(hash.clone(), data);
        hash
    }
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageEndpoint for MockEndpoint {
    async fn add(&self, data: Bytes) -> Result<String> {
        self.record("add")?;
        let hash = self.store(data);
        self.lock().pins.insert(hash.clone());
        Ok(hash)
    }

    async fn cat(&self, hash: &str) -> Result<ContentStream> {
        self.record("cat")?;
        let data = self
            .lock()
            .contents
            .get(hash)
            .cloned()
            .ok_or_else(|| PorticoError::NotFound(format!("{} not found", hash)))?;
        let chunks: Vec<Result<Bytes>> = data
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn object_stat(&self, key: &str) -> Result<ObjectStat> {
        self.record("object_stat")?;
        let state = self.lock();
        let data = state
            .contents
            .get(key)
            .ok_or_else(|| PorticoError::NotFound(format!("{} not found", key)))?;
        let framed = data.len() as u64 + UNIXFS_FRAMING;
        Ok(ObjectStat {
            hash: key.to_string(),
            num_links: 0,
            block_size: framed,
            links_size: 0,
            data_size: framed - 2,
            cumulative_size: framed,
        })
    }

    async fn file_size(&self, hash: &str) -> Result<u64> {
        self.record("file_size")?;
        self.lock()
            .contents
            .get(hash)
            .map(|data| data.len() as u64)
            .ok_or_else(|| PorticoError::NotFound(format!("{} not found", hash)))
    }

    async fn local_pins(&self) -> Result<Vec<PinInfo>> {
        self.record("local_pins")?;
        Ok(self
            .lock()
            .pins
            .iter()
            .map(|hash| PinInfo {
                hash: hash.clone(),
                pin_type: "recursive".to_string(),
            })
            .collect())
    }

    async fn publish_record(&self, request: &RecordPublish) -> Result<PublishedRecord> {
        self.record("publish_record")?;
        let mut state = self.lock();
        let key_id = state
            .keys
            .iter()
            .find(|k| k.name == request.key_name)
            .map(|k| k.id.clone())
            .ok_or_else(|| PorticoError::KeyNotFound(request.key_name.clone()))?;
        state.published.push(request.clone());
        Ok(PublishedRecord {
            name: key_id,
            value: format!("/ipfs/{}", request.content_hash),
        })
    }

    async fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        self.record("list_keys")?;
        Ok(self.lock().keys.clone())
    }

    async fn generate_key(&self, name: &str) -> Result<KeyInfo> {
        self.record("generate_key")?;
        let mut state = self.lock();
        if state.keys.iter().any(|k| k.name == name) {
            return Err(PorticoError::AlreadyExists(format!(
                "key with name '{}' already exists",
                name
            )));
        }
        let key = KeyInfo {
            name: name.to_string(),
            id: format!("k51mock{}{}", state.keys.len(), name),
        };
        state.keys.push(key.clone());
        Ok(key)
    }

    async fn pubsub_publish(&self, topic: &str, message: &str) -> Result<()> {
        self.record("pubsub_publish")?;
        self.emit(topic, Bytes::copy_from_slice(message.as_bytes()));
        Ok(())
    }

    async fn pubsub_subscribe(&self, topic: &str) -> Result<MessageStream> {
        self.record("pubsub_subscribe")?;
        let receiver = self.pubsub.subscribe();
        let topic = topic.to_string();

        Ok(Box::pin(futures::stream::unfold(
            (receiver, topic, 0u64),
            |(mut receiver, topic, mut seqno)| async move {
                loop {
                    match receiver.recv().await {
                        Ok((message_topic, data)) if message_topic == topic => {
                            seqno += 1;
                            let message = PubsubMessage {
                                from: "mock-peer".to_string(),
                                data,
                                seqno: seqno.to_string(),
                                topics: vec![topic.clone()],
                            };
                            return Some((Ok(message), (receiver, topic, seqno)));
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        )))
    }
}

/// Connector that hands out the same mock endpoint for every network
#[derive(Clone)]
pub struct MockConnector {
    endpoint: Arc<MockEndpoint>,
}

impl MockConnector {
    pub fn new(endpoint: Arc<MockEndpoint>) -> Self {
        Self { endpoint }
    }
}

impl EndpointConnector for MockConnector {
    fn connect(&self, _network: &NetworkDoc) -> Result<Arc<dyn StorageEndpoint>> {
        Ok(self.endpoint.clone())
    }
}
