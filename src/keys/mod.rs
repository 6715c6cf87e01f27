//! Per-user IPFS key ownership

pub mod custody;

pub use custody::KeyCustody;
