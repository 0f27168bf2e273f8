// src/config.rs
use crate::error::{TabservError, TabservResult};
use serde::Deserialize;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen host (default: 127.0.0.1)
    pub host: String,

    /// Listen port (default: 8800)
    pub port: u16,

    /// Path prefix prepended to every request URI before resolution
    /// against the tabular source (default: none).
    pub root: String,
}

impl ServerConfig {
    /// Load configuration from `TABSERV_*` environment variables, with
    /// `.env` support.
    pub fn from_env() -> TabservResult<Self> {
        // load .env if present, ignore when missing
        let _ = dotenvy::dotenv();

        let host = std::env::var("TABSERV_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match std::env::var("TABSERV_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| TabservError::Config(format!("invalid TABSERV_PORT: {raw}")))?,
            Err(_) => 8800,
        };
        let root = std::env::var("TABSERV_ROOT").unwrap_or_default();

        Ok(Self { host, port, root })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9000,
            root: String::new(),
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }
}
