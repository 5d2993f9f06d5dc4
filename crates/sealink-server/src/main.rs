//! sealink-server binary entry point

use anyhow::Result;
use sealink_server::{SealinkServer, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;

    let server = SealinkServer::new(config).await?;
    server.run().await?;

    Ok(())
}
