use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bottle_catalog::{CatalogConfig, IngestConfig};
use bottle_catalog_core::Algorithm;

use crate::error::{ServerError, ServerResult};

/// Database path that selects an in-memory store.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Environment variable overriding [`ServerConfig::database`].
pub const DATABASE_ENV: &str = "BOTTLE_CATALOG_DATABASE";

/// Environment variable overriding [`ServerConfig::bind_addr`].
pub const BIND_ENV: &str = "BOTTLE_CATALOG_BIND";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// SQLite file, or `:memory:`.
    pub database: PathBuf,
    pub max_body_bytes: usize,
    /// Algorithm used for uploads that declare neither a digest nor an
    /// algorithm.
    pub default_algorithm: String,
    /// Leave rows that fail to reprocess stale instead of refusing to start.
    pub skip_failed_reprocess: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8100)),
            database: PathBuf::from("catalog.db"),
            max_body_bytes: 10 * 1024 * 1024,
            default_algorithm: Algorithm::DEFAULT.as_str().to_string(),
            skip_failed_reprocess: true,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Override settings from `BOTTLE_CATALOG_DATABASE` and `BOTTLE_CATALOG_BIND`.
    pub fn apply_env(&mut self) -> ServerResult<()> {
        self.apply_overrides(
            std::env::var(DATABASE_ENV).ok(),
            std::env::var(BIND_ENV).ok(),
        )
    }

    fn apply_overrides(&mut self, database: Option<String>, bind: Option<String>) -> ServerResult<()> {
        if let Some(database) = database {
            self.database = PathBuf::from(database);
        }
        if let Some(bind) = bind {
            self.bind_addr = bind
                .parse()
                .map_err(|e| ServerError::Config(format!("{BIND_ENV}={bind}: {e}")))?;
        }
        Ok(())
    }

    pub fn is_memory(&self) -> bool {
        self.database.as_os_str() == MEMORY_DATABASE
    }

    /// The catalog settings these server settings imply.
    pub fn catalog_config(&self) -> ServerResult<CatalogConfig> {
        let default_algorithm = self
            .default_algorithm
            .parse::<Algorithm>()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let mut config = CatalogConfig {
            ingest: IngestConfig { default_algorithm },
            ..CatalogConfig::default()
        };
        config.sweep.skip_failed = self.skip_failed_reprocess;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8100".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_body_bytes, 10 * 1024 * 1024);
        assert!(!c.is_memory());
        let catalog = c.catalog_config().unwrap();
        assert_eq!(catalog.ingest.default_algorithm, Algorithm::Sha256);
        assert!(catalog.sweep.skip_failed);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml_str(
            r#"
            database = ":memory:"
            default_algorithm = "sha512"
            "#,
        )
        .unwrap();
        assert!(c.is_memory());
        assert_eq!(c.max_body_bytes, ServerConfig::default().max_body_bytes);
        assert_eq!(
            c.catalog_config().unwrap().ingest.default_algorithm,
            Algorithm::Sha512
        );
    }

    #[test]
    fn bad_values_are_config_errors() {
        let c = ServerConfig::from_toml_str(r#"default_algorithm = "md5""#).unwrap();
        assert!(matches!(c.catalog_config(), Err(ServerError::Config(_))));
        assert!(ServerConfig::from_toml_str("bind_addr = 7").is_err());

        let mut c = ServerConfig::default();
        assert!(c.apply_overrides(None, Some("nowhere".into())).is_err());
        c.apply_overrides(Some("/tmp/x.db".into()), Some("0.0.0.0:9000".into()))
            .unwrap();
        assert_eq!(c.database, PathBuf::from("/tmp/x.db"));
        assert_eq!(c.bind_addr.port(), 9000);
    }
}
