use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use bottle_catalog::Catalog;
use bottle_catalog_store::SqliteStore;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::AppState;
use crate::router::build_router;

/// Catalog HTTP server.
pub struct CatalogServer {
    config: ServerConfig,
    state: AppState,
}

impl CatalogServer {
    /// Open the configured store and catalog.
    ///
    /// Rows written by older processors are reprocessed before this returns.
    pub async fn open(config: ServerConfig) -> ServerResult<Self> {
        let store = if config.is_memory() {
            SqliteStore::open_memory()?
        } else {
            SqliteStore::open(&config.database)?
        };
        let catalog = Catalog::open(store, config.catalog_config()?).await?;
        Ok(Self::with_catalog(config, Arc::new(catalog)))
    }

    /// Serve an already opened catalog.
    pub fn with_catalog(config: ServerConfig, catalog: Arc<Catalog<SqliteStore>>) -> Self {
        Self {
            config,
            state: AppState { catalog },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog<SqliteStore>> {
        &self.state.catalog
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.max_body_bytes)
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            database = %self.config.database.display(),
            "catalog server listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("catalog server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> ServerConfig {
        ServerConfig {
            database: crate::config::MEMORY_DATABASE.into(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn server_construction() {
        let server = CatalogServer::open(memory_config()).await.unwrap();
        assert_eq!(server.config().bind_addr.port(), 8100);
        let _router = server.router();
    }

    #[tokio::test]
    async fn opens_a_database_file_twice() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            database: dir.path().join("catalog.db"),
            ..ServerConfig::default()
        };
        drop(CatalogServer::open(config.clone()).await.unwrap());
        CatalogServer::open(config).await.unwrap();
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let server = CatalogServer::open(memory_config()).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve_on(listener, async {}).await.unwrap();
    }
}
