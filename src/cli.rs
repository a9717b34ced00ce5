//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Authenticated media-access gateway over an object store
#[derive(Parser, Debug)]
#[command(name = "media-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MEDIA_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MEDIA_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MEDIA_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Expected token audience (Firebase project id)
    #[arg(long, env = "MEDIA_GATEWAY_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MEDIA_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MEDIA_GATEWAY_LOG_FORMAT")]
    pub log_format: Option<String>,
}
