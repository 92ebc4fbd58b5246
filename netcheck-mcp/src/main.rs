//! MCP Server entry point for netcheck
//!
//! Loads the engine configuration and serves the diagnostic tools over a stdio
//! transport.
//!
//! # Configuration
//!
//! The TOML configuration is read from `$NETCHECK_CONFIG` when set, otherwise
//! from `<config_dir>/netcheck/config.toml`. A missing file means defaults.

mod schemas;
mod server;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use netcheck_engine::{DiagnosticsService, EngineConfig};
use rmcp::ServiceExt;
use server::NetcheckMcp;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "NETCHECK_CONFIG";

/// Where to look for the configuration file, if anywhere.
fn config_path(env_override: Option<OsString>, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    env_override
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| config_dir.map(|dir| dir.join("netcheck").join("config.toml")))
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match config_path(std::env::var_os(CONFIG_ENV), dirs::config_dir()) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            Ok(EngineConfig::load(&path)?)
        }
        None => {
            tracing::warn!("No configuration directory found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing to stderr (MCP uses stdout for protocol).
    // `init` also forwards the engine's `log` records.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    tracing::info!("Starting netcheck MCP Server");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match DiagnosticsService::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to initialize diagnostics engine: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("DNS checks use nameservers: {}", engine.nameservers());

    let mcp_server = NetcheckMcp::new(Arc::new(engine));

    tracing::info!("MCP server initialized with 4 tools");

    // Start serving via stdio
    tracing::info!("Starting MCP server on stdio transport");
    let service = match mcp_server.serve(rmcp::transport::stdio()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start MCP server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Wait for the server to complete
    if let Err(e) = service.waiting().await {
        tracing::error!("MCP server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
