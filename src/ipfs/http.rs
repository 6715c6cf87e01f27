//! IPFS HTTP API client (`/api/v0/*`) built on reqwest

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::endpoint::{
    ContentStream, EndpointConnector, KeyInfo, MessageStream, ObjectStat, PinInfo,
    PublishedRecord, PubsubMessage, RecordPublish, StorageEndpoint,
};
use crate::db::schemas::NetworkDoc;
use crate::naming::duration::format_go_duration;
use crate::types::{PorticoError, Result};

/// Error body returned by the IPFS HTTP API
#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Deserialize)]
struct FilesStatResponse {
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, PinLsEntry>,
}

#[derive(Deserialize)]
struct PinLsEntry {
    #[serde(rename = "Type")]
    pin_type: String,
}

#[derive(Deserialize)]
struct KeyListResponse {
    #[serde(rename = "Keys", default)]
    keys: Vec<KeyInfo>,
}

#[derive(Deserialize)]
struct RawPubsubMessage {
    #[serde(default)]
    from: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    seqno: String,
    #[serde(rename = "topicIDs", default)]
    topic_ids: Vec<String>,
}

/// Client for one network's IPFS HTTP API
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(client: reqwest::Client, api_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn post(&self, command: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/api/v0/{}", self.base_url, command))
    }

    /// Send a request whose whole exchange is bounded by the timeout
    async fn call(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    /// Send a request whose body is streamed; only the headers are bounded
    async fn open_stream(&self, request: RequestBuilder) -> Result<Response> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| PorticoError::Endpoint("timed out waiting for endpoint".into()))?
            .map_err(transport_error)?;
        check_status(response).await
    }

    async fn call_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.call(request).await?;
        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| PorticoError::Protocol(format!("unexpected endpoint response: {}", e)))
    }
}

fn transport_error(err: reqwest::Error) -> PorticoError {
    if err.is_timeout() {
        PorticoError::Endpoint("timed out waiting for endpoint".into())
    } else if err.is_decode() {
        PorticoError::Protocol(err.to_string())
    } else {
        PorticoError::Endpoint(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(classify_api_error(status, message))
}

fn classify_api_error(status: StatusCode, message: String) -> PorticoError {
    let lower = message.to_lowercase();
    if lower.contains("no key by the given name") || lower.contains("no key named") {
        PorticoError::KeyNotFound(message)
    } else if lower.contains("not pinned") || lower.contains("not found") {
        PorticoError::NotFound(message)
    } else if lower.contains("already exists") {
        PorticoError::AlreadyExists(message)
    } else if status == StatusCode::BAD_REQUEST {
        PorticoError::Validation(message)
    } else {
        PorticoError::Endpoint(format!("endpoint returned {}: {}", status, message))
    }
}

/// Multibase base64url encoding used for pubsub topics on the wire
fn encode_topic(topic: &str) -> String {
    format!("u{}", URL_SAFE_NO_PAD.encode(topic.as_bytes()))
}

/// Decode a multibase or plain base64 field, falling back to the raw text
fn decode_field(value: &str) -> Vec<u8> {
    if let Some(encoded) = value.strip_prefix('u') {
        if let Ok(decoded) = URL_SAFE_NO_PAD.decode(encoded) {
            return decoded;
        }
    }
    STANDARD
        .decode(value)
        .unwrap_or_else(|_| value.as_bytes().to_vec())
}

fn decode_pubsub_line(line: &[u8]) -> Result<PubsubMessage> {
    let raw: RawPubsubMessage = serde_json::from_slice(line)
        .map_err(|e| PorticoError::Protocol(format!("malformed pubsub message: {}", e)))?;
    Ok(PubsubMessage {
        from: raw.from,
        data: Bytes::from(decode_field(&raw.data)),
        seqno: raw.seqno,
        topics: raw
            .topic_ids
            .iter()
            .map(|t| String::from_utf8_lossy(&decode_field(t)).into_owned())
            .collect(),
    })
}

/// Split a chunked body into newline-delimited pubsub messages
fn ndjson_messages<S>(body: S) -> MessageStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = (Box::pin(body), Vec::<u8>::new(), false);
    Box::pin(futures::stream::unfold(
        state,
        |(mut body, mut buffer, mut done)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some((decode_pubsub_line(&line), (body, buffer, done)));
                }
                if done {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let line = std::mem::take(&mut buffer);
                    return Some((decode_pubsub_line(&line), (body, buffer, done)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buffer.clear();
                        return Some((Err(transport_error(e)), (body, buffer, true)));
                    }
                    None => done = true,
                }
            }
        },
    ))
}

#[async_trait]
impl StorageEndpoint for HttpEndpoint {
    async fn add(&self, data: Bytes) -> Result<String> {
        let size = data.len();
        let form = Form::new().part("file", Part::stream(data).file_name("file"));
        let response = self.call(self.post("add").multipart(form)).await?;
        let body = response.text().await.map_err(transport_error)?;

        // One JSON object per line; the last one describes the root
        let last = body
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| PorticoError::Protocol("empty add response".into()))?;
        let added: AddResponse = serde_json::from_str(last)
            .map_err(|e| PorticoError::Protocol(format!("unexpected add response: {}", e)))?;

        debug!(hash = %added.hash, size, "Content added to endpoint");
        Ok(added.hash)
    }

    async fn cat(&self, hash: &str) -> Result<ContentStream> {
        let response = self
            .open_stream(self.post("cat").query(&[("arg", hash)]))
            .await?;
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(transport_error)),
        ))
    }

    async fn object_stat(&self, key: &str) -> Result<ObjectStat> {
        self.call_json(self.post("object/stat").query(&[("arg", key)]))
            .await
    }

    async fn file_size(&self, hash: &str) -> Result<u64> {
        let path = format!("/ipfs/{}", hash);
        let stat: FilesStatResponse = self
            .call_json(self.post("files/stat").query(&[("arg", path.as_str())]))
            .await?;
        Ok(stat.size)
    }

    async fn local_pins(&self) -> Result<Vec<PinInfo>> {
        let listing: PinLsResponse = self
            .call_json(self.post("pin/ls").query(&[("type", "recursive")]))
            .await?;
        let mut pins: Vec<PinInfo> = listing
            .keys
            .into_iter()
            .map(|(hash, entry)| PinInfo {
                hash,
                pin_type: entry.pin_type,
            })
            .collect();
        pins.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(pins)
    }

    async fn publish_record(&self, request: &RecordPublish) -> Result<PublishedRecord> {
        let path = format!("/ipfs/{}", request.content_hash);
        let lifetime = format_go_duration(request.lifetime);
        let ttl = format_go_duration(request.ttl);
        let resolve = request.resolve.to_string();

        self.call_json(self.post("name/publish").query(&[
            ("arg", path.as_str()),
            ("key", request.key_name.as_str()),
            ("lifetime", lifetime.as_str()),
            ("ttl", ttl.as_str()),
            ("resolve", resolve.as_str()),
        ]))
        .await
    }

    async fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let listing: KeyListResponse = self
            .call_json(self.post("key/list").query(&[("l", "true")]))
            .await?;
        Ok(listing.keys)
    }

    async fn generate_key(&self, name: &str) -> Result<KeyInfo> {
        self.call_json(
            self.post("key/gen")
                .query(&[("arg", name), ("type", "ed25519")]),
        )
        .await
    }

    async fn pubsub_publish(&self, topic: &str, message: &str) -> Result<()> {
        let form = Form::new().part(
            "data",
            Part::bytes(message.as_bytes().to_vec()).file_name("data"),
        );
        self.call(
            self.post("pubsub/pub")
                .query(&[("arg", encode_topic(topic))])
                .multipart(form),
        )
        .await?;
        Ok(())
    }

    async fn pubsub_subscribe(&self, topic: &str) -> Result<MessageStream> {
        let response = self
            .open_stream(self.post("pubsub/sub").query(&[("arg", encode_topic(topic))]))
            .await?;
        Ok(ndjson_messages(response.bytes_stream()))
    }
}

/// Connects to each network's `api_url` over a shared reqwest client
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("portico/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PorticoError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

impl EndpointConnector for HttpConnector {
    fn connect(&self, network: &NetworkDoc) -> Result<Arc<dyn StorageEndpoint>> {
        Ok(Arc::new(HttpEndpoint::new(
            self.client.clone(),
            &network.api_url,
            self.timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_encoding_is_multibase() {
        assert_eq!(encode_topic("news"), "ubmV3cw");
        assert_eq!(decode_field("ubmV3cw"), b"news");
    }

    #[test]
    fn test_classify_api_errors() {
        let err = classify_api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "no key by the given name was found".into(),
        );
        assert_eq!(err.kind(), crate::types::ErrorKind::KeyNotFound);

        let err = classify_api_error(StatusCode::INTERNAL_SERVER_ERROR, "not pinned or pinned indirectly".into());
        assert_eq!(err.kind(), crate::types::ErrorKind::NotFound);

        let err = classify_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom".into());
        assert_eq!(err.kind(), crate::types::ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn test_ndjson_split_across_chunks() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"from\":\"peer1\",\"data\":\"uaGk\",\"seqno\":\"1\",")),
            Ok(Bytes::from_static(b"\"topicIDs\":[\"ubmV3cw\"]}\n\n{\"from\":\"peer2\",")),
            Ok(Bytes::from_static(b"\"data\":\"uYnll\",\"seqno\":\"2\",\"topicIDs\":[]}")),
        ];
        let messages: Vec<_> = ndjson_messages(futures::stream::iter(chunks))
            .collect()
            .await;

        assert_eq!(messages.len(), 2);
        let first = messages[0].as_ref().unwrap();
        assert_eq!(first.from, "peer1");
        assert_eq!(&first.data[..], b"hi");
        assert_eq!(first.topics, vec!["news".to_string()]);
        assert_eq!(&messages[1].as_ref().unwrap().data[..], b"bye");
    }
}
