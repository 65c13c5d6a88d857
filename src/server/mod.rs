//! HTTP server module for asnmap
//!
//! Serves the lookup orchestrator over HTTP:
//!
//! - `GET /iplookup?ip=<literal>`: match, summarize and (in the background) sync
//! - `GET /health`: liveness probe
//!
//! # Usage
//!
//! ```rust,ignore
//! use asnmap::server::{start_server, ServerConfig, ServerState};
//!
//! let state = ServerState::new(lens);
//! let config = ServerConfig::default().with_port(5000);
//! start_server(state, config).await?;
//! ```

pub mod handlers;

use crate::lens::lookup::LookupLens;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub address: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Get the full bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// =============================================================================
// Server State
// =============================================================================

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub lens: LookupLens,
}

impl ServerState {
    pub fn new(lens: LookupLens) -> Self {
        Self { lens }
    }
}

// =============================================================================
// Axum Router Creation
// =============================================================================

/// Create the Axum router for the HTTP API
pub fn create_axum_router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/iplookup", get(handlers::iplookup_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}

// =============================================================================
// Server Startup
// =============================================================================

/// Start the HTTP server and run until Ctrl-C
pub async fn start_server(state: ServerState, config: ServerConfig) -> anyhow::Result<()> {
    let app = create_axum_router(state);

    let bind_address = config.bind_address();
    tracing::info!("Starting HTTP server on {}", bind_address);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down HTTP server");
            }
        })
        .await?;

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_server_config_builder() {
        let config = ServerConfig::new().with_address("0.0.0.0").with_port(9000);

        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn test_health_handler() {
        assert_eq!(health_handler().await, "OK");
    }
}
