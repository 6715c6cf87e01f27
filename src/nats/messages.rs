//! Request messages handed to the asynchronous consumers
//!
//! Each operation kind has its own subject under `portico.requests`. Every
//! message is wrapped in an [`Envelope`] carrying a unique request id that
//! consumers use to discard redeliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Subject prefix for all request messages
pub const SUBJECT_PREFIX: &str = "portico.requests";

/// Routing destination, one per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exchange {
    Pin,
    PinRemoval,
    FileAdd,
    NamingRecordUpdate,
}

impl Exchange {
    pub fn subject(&self) -> String {
        let leaf = match self {
            Exchange::Pin => "pin",
            Exchange::PinRemoval => "pin_removal",
            Exchange::FileAdd => "file_add",
            Exchange::NamingRecordUpdate => "ipns_update",
        };
        format!("{}.{}", SUBJECT_PREFIX, leaf)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Pin => write!(f, "pin"),
            Exchange::PinRemoval => write!(f, "pin-removal"),
            Exchange::FileAdd => write!(f, "file-add"),
            Exchange::NamingRecordUpdate => write!(f, "naming-record-update"),
        }
    }
}

/// A payload bound to the exchange it travels on
pub trait QueueMessage: Serialize + Send + Sync {
    const EXCHANGE: Exchange;
}

/// Wire format of every queued request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub request_id: String,
    pub issued_at: DateTime<Utc>,
    pub exchange: Exchange,
    #[serde(flatten)]
    pub payload: T,
}

impl<T: QueueMessage> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
            exchange: T::EXCHANGE,
            payload,
        }
    }
}

/// Pin content on a hosted network for a hold period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRequest {
    pub content_hash: String,
    pub network_name: String,
    pub caller_address: String,
    pub hold_months: u32,
}

impl QueueMessage for PinRequest {
    const EXCHANGE: Exchange = Exchange::Pin;
}

/// Remove a pin from a hosted network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRemoval {
    pub content_hash: String,
    pub network_name: String,
    pub caller_address: String,
}

impl QueueMessage for PinRemoval {
    const EXCHANGE: Exchange = Exchange::PinRemoval;
}

/// Record content already added to a hosted network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAdd {
    pub content_hash: String,
    pub network_name: String,
    pub uploader_address: String,
    pub hold_months: u32,
}

impl QueueMessage for FileAdd {
    const EXCHANGE: Exchange = Exchange::FileAdd;
}

/// Propagate a freshly published IPNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRecordUpdate {
    pub content_hash: String,
    pub record_name: String,
    pub record_value: String,
    /// Go duration string
    pub lifetime: String,
    /// Go duration string
    pub ttl: String,
    pub key_name: String,
    pub resolve: bool,
    pub network_name: String,
    pub caller_address: String,
}

impl QueueMessage for NamingRecordUpdate {
    const EXCHANGE: Exchange = Exchange::NamingRecordUpdate;
}
