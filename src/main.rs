use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warrant_relay::config::RelayConfig;
use warrant_relay::relay::{router, SharedState};
use warrant_relay::store::EventStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (WARRANT_LOG_JSON=1), human-readable otherwise.
    let json_logs = std::env::var("WARRANT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("warrant_relay=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RelayConfig::parse();
    tracing::info!("Starting relay on {}", config.listen_addr);
    tracing::info!(db_path = %config.db_path, "Opening event store");

    let store = Arc::new(EventStore::open(&config.db_path, config.kinds())?);
    let listen_addr = config.listen_addr;
    let state = SharedState::new(store, config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
