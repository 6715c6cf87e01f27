//! IPNS record publication
//!
//! Validates everything locally, checks key ownership, publishes through
//! the network's endpoint, persists the entry, then queues an update for
//! the downstream consumers. A failure before the endpoint publish leaves
//! nothing behind; a failure after it reports what already happened.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bson::DateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::duration::{format_go_duration, parse_go_duration};
use crate::auth::Identity;
use crate::db::schemas::NamingRecordDoc;
use crate::dispatch::Dispatcher;
use crate::ipfs::{EndpointConnector, RecordPublish};
use crate::keys::KeyCustody;
use crate::nats::NamingRecordUpdate;
use crate::networks::NetworkRegistry;
use crate::store::NamingRecordStore;
use crate::types::{CompletedEffect, PorticoError, Result};

/// Caller-supplied publish request, as received from the transport
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamingRecordRequest {
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub lifetime: String,
    #[serde(default)]
    pub ttl: String,
    #[serde(default)]
    pub key_name: String,
    #[serde(default)]
    pub resolve: String,
}

/// Outcome of a successful publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishedNamingRecord {
    pub record_name: String,
    pub record_value: String,
    /// Time spent in the endpoint publish call
    pub elapsed_ms: u64,
    pub request_id: String,
}

/// A request that passed local validation
#[derive(Debug)]
struct ValidatedRequest {
    network_name: String,
    content_hash: String,
    key_name: String,
    lifetime: Duration,
    ttl: Duration,
    resolve: bool,
}

#[derive(Clone)]
pub struct NamingRecordPublisher {
    registry: NetworkRegistry,
    custody: KeyCustody,
    connector: Arc<dyn EndpointConnector>,
    records: Arc<dyn NamingRecordStore>,
    dispatcher: Dispatcher,
}

impl NamingRecordPublisher {
    pub fn new(
        registry: NetworkRegistry,
        custody: KeyCustody,
        connector: Arc<dyn EndpointConnector>,
        records: Arc<dyn NamingRecordStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            registry,
            custody,
            connector,
            records,
            dispatcher,
        }
    }

    pub async fn publish(
        &self,
        caller: &Identity,
        request: NamingRecordRequest,
    ) -> Result<PublishedNamingRecord> {
        let request = validate(request)?;

        let owns = match self.custody.owns_key(&caller.address, &request.key_name).await {
            Ok(owns) => owns,
            Err(PorticoError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        if !owns {
            return Err(PorticoError::Forbidden(format!(
                "key {} is not owned by caller",
                request.key_name
            )));
        }

        let network = self
            .registry
            .authorize(caller, &request.network_name)
            .await?;
        let endpoint = self.connector.connect(&network)?;

        let key_id = self
            .custody
            .key_identifier_for(&caller.address, &request.key_name)
            .await?;
        self.custody
            .confirm_in_keystore(endpoint.as_ref(), &request.key_name, &key_id)
            .await?;

        let started = Instant::now();
        let record = endpoint
            .publish_record(&RecordPublish {
                content_hash: request.content_hash.clone(),
                key_name: request.key_name.clone(),
                lifetime: request.lifetime,
                ttl: request.ttl,
                resolve: request.resolve,
            })
            .await?;
        let elapsed = started.elapsed();

        info!(
            network = %request.network_name,
            record = %record.name,
            elapsed_ms = elapsed.as_millis() as u64,
            "IPNS record published"
        );

        let lifetime = format_go_duration(request.lifetime);
        let ttl = format_go_duration(request.ttl);
        let entry = NamingRecordDoc {
            record_name: record.name.clone(),
            record_value: record.value.clone(),
            content_hash: request.content_hash.clone(),
            key_name: request.key_name.clone(),
            network_name: request.network_name.clone(),
            lifetime: lifetime.clone(),
            ttl: ttl.clone(),
            last_published: Some(DateTime::now()),
            ..Default::default()
        };
        let published = |entry_persisted| CompletedEffect::RecordPublished {
            record_name: record.name.clone(),
            record_value: record.value.clone(),
            entry_persisted,
        };

        if let Err(e) = self.records.upsert_record(entry).await {
            warn!(record = %record.name, error = %e, "Published record not persisted");
            return Err(e.with_completed(published(false)));
        }

        let receipt = self
            .dispatcher
            .enqueue(NamingRecordUpdate {
                content_hash: request.content_hash,
                record_name: record.name.clone(),
                record_value: record.value.clone(),
                lifetime,
                ttl,
                key_name: request.key_name,
                resolve: request.resolve,
                network_name: request.network_name,
                caller_address: caller.address.clone(),
            })
            .await
            .map_err(|e| e.with_completed(published(true)))?;

        Ok(PublishedNamingRecord {
            record_name: record.name,
            record_value: record.value,
            elapsed_ms: elapsed.as_millis() as u64,
            request_id: receipt.request_id,
        })
    }

    /// Last published state of a record on a network the caller may use
    pub async fn lookup(&self, caller: &Identity, record_name: &str) -> Result<NamingRecordDoc> {
        let entry = self
            .records
            .find_record(record_name)
            .await?
            .ok_or_else(|| PorticoError::NotFound(format!("record {} not found", record_name)))?;
        self.registry.authorize(caller, &entry.network_name).await?;
        Ok(entry)
    }
}

fn validate(request: NamingRecordRequest) -> Result<ValidatedRequest> {
    let required = [
        ("network_name", &request.network_name),
        ("hash", &request.content_hash),
        ("lifetime", &request.lifetime),
        ("ttl", &request.ttl),
        ("key", &request.key_name),
        ("resolve", &request.resolve),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(PorticoError::Validation(format!("{} is required", field)));
        }
    }

    let lifetime = positive_duration("lifetime", &request.lifetime)?;
    let ttl = positive_duration("ttl", &request.ttl)?;
    let resolve = parse_bool(&request.resolve).ok_or_else(|| {
        PorticoError::Validation(format!("resolve must be a boolean, got {:?}", request.resolve))
    })?;

    Ok(ValidatedRequest {
        network_name: request.network_name,
        content_hash: request.content_hash.trim().to_string(),
        key_name: request.key_name,
        lifetime,
        ttl,
        resolve,
    })
}

fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let duration =
        parse_go_duration(value).map_err(|e| PorticoError::Validation(format!("{}: {}", field, e)))?;
    if duration.is_zero() {
        return Err(PorticoError::Validation(format!("{} must be positive", field)));
    }
    Ok(duration)
}

/// Boolean spellings accepted by Go's `strconv.ParseBool`
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NamingRecordRequest {
        NamingRecordRequest {
            network_name: "alpha".into(),
            content_hash: "Qm123".into(),
            lifetime: "24h".into(),
            ttl: "1h".into(),
            key_name: "k1".into(),
            resolve: "true".into(),
        }
    }

    #[test]
    fn test_validate_parses_fields() {
        let validated = validate(request()).unwrap();
        assert_eq!(validated.lifetime, Duration::from_secs(86_400));
        assert_eq!(validated.ttl, Duration::from_secs(3_600));
        assert!(validated.resolve);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let cases = [
            NamingRecordRequest {
                lifetime: "notaduration".into(),
                ..request()
            },
            NamingRecordRequest {
                ttl: "0s".into(),
                ..request()
            },
            NamingRecordRequest {
                resolve: "maybe".into(),
                ..request()
            },
            NamingRecordRequest {
                key_name: "".into(),
                ..request()
            },
        ];
        for case in cases {
            let err = validate(case).unwrap_err();
            assert_eq!(err.kind(), crate::types::ErrorKind::ValidationError);
        }
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
