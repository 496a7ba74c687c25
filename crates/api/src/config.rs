//! Server configuration from environment variables

use std::net::SocketAddr;

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string (required).
    pub database_url: String,
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Allowed CORS origin for the portal frontend. When unset, any origin
    /// is allowed (development mode).
    pub frontend_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid HOST/PORT: {e}"))?;

        let frontend_url = std::env::var("FRONTEND_URL").ok().filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            frontend_url,
        })
    }
}
