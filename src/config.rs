//! Configuration for Portico
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Portico - gateway for hosted IPFS networks
#[derive(Parser, Debug, Clone)]
#[command(name = "portico")]
#[command(about = "Multi-tenant gateway for hosted IPFS networks")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:6767")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory persistence, logging publisher)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "portico")]
    pub mongodb_db: String,

    /// JWT secret for verifying caller tokens (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Lifetime of issued session tokens
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Address of the administrative identity.
    /// Receives the admin role when it authenticates and becomes the
    /// default grantee of newly registered networks.
    #[arg(long, env = "ADMIN_ADDRESS")]
    pub admin_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Timeout in milliseconds for storage endpoint calls and broker acks
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// JetStream stream holding request messages
    #[arg(long, env = "NATS_STREAM", default_value = "PORTICO_REQUESTS")]
    pub nats_stream: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Result<String, String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-mode-secret-not-for-production-use-123456".to_string()),
            (None, false) => Err("JWT_SECRET is required in production mode".to_string()),
        }
    }

    /// Get effective admin address (uses default in dev mode)
    pub fn admin_address(&self) -> Result<String, String> {
        match (&self.admin_address, self.dev_mode) {
            (Some(addr), _) => Ok(addr.clone()),
            (None, true) => Ok("0xdev-admin".to_string()),
            (None, false) => Err("ADMIN_ADDRESS is required in production mode".to_string()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret()?.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters".to_string());
        }
        self.admin_address()?;

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }
}
