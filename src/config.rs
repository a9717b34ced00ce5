//! Configuration management

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::auth::DEFAULT_JWKS_URI;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Token verification configuration
    pub auth: AuthConfig,
    /// Object store configuration
    pub store: StoreConfig,
    /// Catalog / index configuration
    pub catalog: CatalogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Firebase project id — the expected `aud` claim. Required.
    pub project_id: String,
    /// JWK endpoint for the issuer's signing keys
    pub jwks_uri: String,
    /// How long a fetched JWKS stays cached, in seconds
    pub jwks_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            jwks_uri: DEFAULT_JWKS_URI.to_string(),
            jwks_ttl_secs: 3600,
        }
    }
}

/// Which object store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Filesystem under `store.root`
    Fs,
    /// In-memory (volatile; tests and demos)
    Memory,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Root directory for the `fs` backend
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("data"),
        }
    }
}

/// Catalog / index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Reserved key of the public index object
    pub index_key: String,
    /// Service name reported by the bare status endpoint
    pub service_name: String,
    /// Shared cache lifetime for the public index, in seconds
    pub index_max_age_secs: u64,
    /// Private cache lifetime for streamed objects, in seconds
    pub object_max_age_secs: u64,
    /// Conditional-write attempts for the delete-side index rewrite
    pub reindex_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_key: "tracks.json".to_string(),
            service_name: "Media Gateway".to_string(),
            index_max_age_secs: 60,
            object_max_age_secs: 3600,
            reindex_retries: 3,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and the environment.
    ///
    /// Environment variables use the `MEDIA_GATEWAY_` prefix with `__` as the
    /// section separator, e.g. `MEDIA_GATEWAY_AUTH__PROJECT_ID`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("MEDIA_GATEWAY_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field requirements figment cannot express.
    ///
    /// Called by `main` after CLI overrides are applied, not by [`load`](Self::load),
    /// so required fields may arrive from any layer.
    pub fn validate(&self) -> Result<()> {
        if self.auth.project_id.is_empty() {
            return Err(Error::Config(
                "auth.project_id is required (expected token audience)".to_string(),
            ));
        }
        if self.catalog.index_key.is_empty() {
            return Err(Error::Config("catalog.index_key must not be empty".to_string()));
        }
        if self.catalog.reindex_retries == 0 {
            return Err(Error::Config(
                "catalog.reindex_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
