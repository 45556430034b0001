use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use bottle_catalog_server::{CatalogServer, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => ServerConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = ServerConfig::default();
            config.apply_env()?;
            config
        }
    };

    let server = CatalogServer::open(config)
        .await
        .context("opening catalog")?;
    server.serve().await?;
    Ok(())
}
