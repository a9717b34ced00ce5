//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::router::{AppState, create_router};
use crate::auth::FirebaseVerifier;
use crate::config::{Config, StoreBackend};
use crate::store::{FsStore, MemoryStore, ObjectStore};
use crate::{Error, Result};

/// Media gateway server
pub struct Gateway {
    config: Config,
    store: Arc<dyn ObjectStore>,
}

impl Gateway {
    /// Create a new gateway from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.store.backend {
            StoreBackend::Fs => {
                std::fs::create_dir_all(&config.store.root)?;
                Arc::new(FsStore::new(config.store.root.clone()))
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        Ok(Self { config, store })
    }

    /// Run the gateway until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let verifier = Arc::new(
            FirebaseVerifier::new(
                self.config.auth.project_id.clone(),
                self.config.auth.jwks_uri.clone(),
                Duration::from_secs(self.config.auth.jwks_ttl_secs),
            )
            .map_err(|e| Error::Config(format!("Failed to build token verifier: {e}")))?,
        );

        let state = Arc::new(AppState {
            store: Arc::clone(&self.store),
            verifier,
            catalog: self.config.catalog.clone(),
        });

        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("MEDIA GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(index = %self.config.catalog.index_key, "Public index (no auth)");
        info!(project = %self.config.auth.project_id, "Token audience");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
