//! Database schemas for Portico
//!
//! MongoDB document structures for hosted networks, user accounts and
//! IPNS entries.

mod metadata;
mod naming_record;
mod network;
mod user;

pub use metadata::Metadata;
pub use naming_record::{NamingRecordDoc, NAMING_RECORD_COLLECTION};
pub use network::{NetworkDoc, NetworkView, PeerPair, NETWORK_COLLECTION};
pub use user::{OwnedKey, UserDoc, UserView, USER_COLLECTION};
