// crates/chat-client/src/config.rs

use std::io;

use chat_protocol::{parse_port, InvalidPort, DEFAULT_PORT};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    /// Build from optional positional arguments, falling back to defaults.
    pub fn from_args(host: Option<&str>, port: Option<&str>) -> Result<Self, ClientError> {
        let mut config = ClientConfig::default();
        if let Some(host) = host {
            config.host = host.to_string();
        }
        if let Some(port) = port {
            config.port = parse_port(port)?;
        }
        Ok(config)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Startup failures, each reported to the user differently.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    InvalidPort(#[from] InvalidPort),

    #[error("unknown host {host:?}")]
    UnknownHost {
        host: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("connection to {addr} refused; is the server running?")]
    ConnectionRefused { addr: String },

    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}
