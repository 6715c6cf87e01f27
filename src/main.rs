//! Portico - multi-tenant gateway for hosted IPFS networks

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portico::{
    auth::JwtValidator,
    config::Args,
    db::{MongoClient, MongoStore},
    dispatch::{LoggingPublisher, MessagePublisher, NatsPublisher},
    gateway::Gateway,
    ipfs::HttpConnector,
    nats::NatsClient,
    server::{self, AppState},
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("portico={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    let jwt_secret = args.jwt_secret().map_err(anyhow::Error::msg)?;
    let admin_address = args.admin_address().map_err(anyhow::Error::msg)?;

    info!("======================================");
    info!("  Portico - hosted IPFS network gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {} (stream {})", args.nats.nats_url, args.nats.nats_stream);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Admin: {}", admin_address);
    info!("Request timeout: {}ms", args.request_timeout_ms);
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => Some(client),
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Connect to NATS (logging publisher in dev mode)
    let nats = match NatsClient::new(&args.nats, "portico").await {
        Ok(client) => {
            let client = client.with_timeout(args.request_timeout());
            client.ensure_stream().await?;
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, messages will only be logged): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let publisher: Arc<dyn MessagePublisher> = match &nats {
        Some(client) => Arc::new(NatsPublisher::new(client.clone())),
        None => Arc::new(LoggingPublisher),
    };
    let connector = Arc::new(HttpConnector::new(args.request_timeout())?);

    let gateway = match &mongo {
        Some(client) => {
            let store = Arc::new(MongoStore::open(client).await?);
            Gateway::with_store(store, connector, publisher, &admin_address)
        }
        None => Gateway::with_store(
            Arc::new(MemoryStore::new()),
            connector,
            publisher,
            &admin_address,
        ),
    };

    let state = Arc::new(AppState {
        jwt: JwtValidator::new(jwt_secret, args.jwt_expiry_seconds)?,
        gateway: gateway.clone(),
        args,
    });

    tokio::select! {
        result = server::run(state) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    gateway.shutdown().await;
    if let Some(client) = nats {
        if let Err(e) = client.flush().await {
            warn!("NATS flush on shutdown failed: {}", e);
        }
    }

    info!("Portico stopped");
    Ok(())
}
