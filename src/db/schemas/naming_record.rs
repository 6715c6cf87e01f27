//! IPNS entry document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for IPNS entries
pub const NAMING_RECORD_COLLECTION: &str = "ipns_entries";

/// Last known state of a published IPNS record
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NamingRecordDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// IPNS name returned by the endpoint (hash of the publishing key)
    pub record_name: String,

    /// Path the record resolves to (e.g. "/ipfs/Qm...")
    pub record_value: String,

    pub content_hash: String,

    pub key_name: String,

    pub network_name: String,

    /// Go duration string, e.g. "24h0m0s"
    pub lifetime: String,

    /// Go duration string, e.g. "1h0m0s"
    pub ttl: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_published: Option<DateTime>,
}

impl IntoIndexes for NamingRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "record_name": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("record_name_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "network_name": 1 },
                Some(
                    IndexOptions::builder()
                        .name("network_name_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for NamingRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
