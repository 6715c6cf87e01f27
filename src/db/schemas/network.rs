//! Hosted network document schema
//!
//! One document per private IPFS network fronted by the gateway.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for hosted networks
pub const NETWORK_COLLECTION: &str = "networks";

/// A local node address and the bootstrap peer registered alongside it
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerPair {
    pub local_node_address: String,
    pub bootstrap_peer_address: String,
}

/// Hosted network descriptor stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NetworkDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Unique logical network name
    pub name: String,

    /// IPFS HTTP API endpoint (e.g. "http://10.0.0.5:5001")
    pub api_url: String,

    /// Swarm key shared by the network's nodes
    pub swarm_key: String,

    /// Node/bootstrap address pairs, in registration order
    #[serde(default)]
    pub peers: Vec<PeerPair>,

    /// Addresses of users granted access
    #[serde(default)]
    pub authorized_users: Vec<String>,
}

impl NetworkDoc {
    pub fn new(name: String, api_url: String, swarm_key: String, peers: Vec<PeerPair>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            api_url,
            swarm_key,
            peers,
            authorized_users: Vec::new(),
        }
    }

    pub fn local_node_addresses(&self) -> Vec<&str> {
        self.peers
            .iter()
            .map(|p| p.local_node_address.as_str())
            .collect()
    }

    pub fn bootstrap_peer_addresses(&self) -> Vec<&str> {
        self.peers
            .iter()
            .map(|p| p.bootstrap_peer_address.as_str())
            .collect()
    }

    pub fn is_authorized(&self, address: &str) -> bool {
        self.authorized_users.iter().any(|u| u == address)
    }

    /// Public view with the swarm key removed
    pub fn view(&self) -> NetworkView {
        NetworkView {
            name: self.name.clone(),
            api_url: self.api_url.clone(),
            local_node_addresses: self
                .local_node_addresses()
                .into_iter()
                .map(String::from)
                .collect(),
            bootstrap_peer_addresses: self
                .bootstrap_peer_addresses()
                .into_iter()
                .map(String::from)
                .collect(),
            authorized_users: self.authorized_users.clone(),
        }
    }
}

/// Network descriptor as returned to callers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetworkView {
    pub name: String,
    pub api_url: String,
    pub local_node_addresses: Vec<String>,
    pub bootstrap_peer_addresses: Vec<String>,
    pub authorized_users: Vec<String>,
}

impl IntoIndexes for NetworkDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for NetworkDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
