//! Portico - multi-tenant gateway for hosted IPFS networks
//!
//! Portico fronts a set of private IPFS networks. Callers are authorized
//! per network, synchronous requests go straight to the network's IPFS
//! HTTP API, and bookkeeping work is handed to asynchronous consumers over
//! NATS JetStream.
//!
//! ## Services
//!
//! - **Networks**: registry of hosted networks and per-user grants
//! - **Content**: pins, uploads, downloads and object statistics
//! - **Keys**: keystore keys owned by users
//! - **Naming**: IPNS record publication and lookup
//! - **Pubsub**: publish passthrough and tracked background subscriptions

pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod gateway;
pub mod ipfs;
pub mod keys;
pub mod naming;
pub mod nats;
pub mod networks;
pub mod pubsub;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use gateway::Gateway;
pub use server::{run, AppState};
pub use types::{PorticoError, Result};
