//! Media Gateway Library
//!
//! A stateless edge gateway in front of an object store holding a music
//! catalog:
//!
//! - **Public index**: serves `tracks.json` without authentication so clients
//!   can render the catalog before signing in
//! - **Token-gated streaming**: every other object requires a verified
//!   Firebase ID token (`Authorization: Bearer <jwt>`)
//! - **Delete-and-reindex**: `DELETE` removes an object and rewrites the
//!   index under a bounded compare-and-swap loop
//!
//! The gateway holds no per-request state; the only shared mutable state is
//! the index object inside the store itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod index;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
