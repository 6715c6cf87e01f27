//! Hosted network registry, peer address validation and access control

pub mod address;
pub mod registry;

pub use address::{validate_peer_address, AddressError};
pub use registry::{NetworkRegistry, RegisterNetwork};
