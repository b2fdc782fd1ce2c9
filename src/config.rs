use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: Option<String>,
    pub bind_addr: String,
    /// No port means the server speaks MCP over stdio instead of HTTP.
    pub bind_port: Option<u16>,
    pub sse_keep_alive: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_SSE_KEEP_ALIVE_SECS must be a positive number of seconds")]
    InvalidKeepAlive,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            bind_addr: "127.0.0.1".to_string(),
            bind_port: None,
            sse_keep_alive: Duration::from_secs(DEFAULT_SSE_KEEP_ALIVE_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_token = non_empty("MCP_API_TOKEN");
        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?;
        let sse_keep_alive = non_empty("MCP_SSE_KEEP_ALIVE_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ConfigError::InvalidKeepAlive)
            })
            .transpose()?
            .unwrap_or(Duration::from_secs(DEFAULT_SSE_KEEP_ALIVE_SECS));

        let config = Self {
            api_token,
            bind_addr,
            bind_port,
            sse_keep_alive,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    /// The HTTP listen address, or `None` in stdio mode.
    pub fn bind_socket(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.bind_port
            .map(|port| {
                format!("{}:{}", self.bind_addr, port)
                    .parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidSocket)
            })
            .transpose()
    }
}
