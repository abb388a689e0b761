//! Configuration for the chat server.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config`),
//! 3. environment variables:
//!    - `CHAT_BIND_ADDR`      (default: "0.0.0.0")
//!    - `CHAT_PORT`           (default: "2000")
//!    - `CHAT_ECHO_TO_SENDER` (default: "true")
//! 4. the positional port argument.

use std::env;
use std::path::{Path, PathBuf};

use chat_protocol::{parse_port, InvalidPort, DEFAULT_PORT};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_BIND_ADDR: &str = "CHAT_BIND_ADDR";
pub const ENV_PORT: &str = "CHAT_PORT";
pub const ENV_ECHO_TO_SENDER: &str = "CHAT_ECHO_TO_SENDER";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. `0` asks the OS for an ephemeral port.
    pub port: u16,

    /// Whether a client receives its own messages back in the broadcast.
    pub echo_to_sender: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            echo_to_sender: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidPort(#[from] InvalidPort),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Load a TOML file; keys missing from the file keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CHAT_*` overrides, reading each key through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = bind_addr;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = parse_port(&port)?;
        }
        if let Some(echo) = lookup(ENV_ECHO_TO_SENDER) {
            self.echo_to_sender = parse_bool(ENV_ECHO_TO_SENDER, &echo)?;
        }
        Ok(self)
    }

    /// Override the port from a command-line argument.
    pub fn with_port_arg(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.port = parse_port(raw)?;
        Ok(self)
    }

    /// `addr:port` socket string; IPv6 addresses get brackets.
    pub fn socket_addr_string(&self) -> String {
        let host = self.bind_addr.as_str();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_listen_on_2000_with_echo() {
        let config = Config::default();
        assert_eq!(config.socket_addr_string(), "0.0.0.0:2000");
        assert!(config.echo_to_sender);
    }

    #[test]
    fn ipv6_bind_addr_is_bracketed() {
        let config = Config {
            bind_addr: "::".to_string(),
            ..Config::default()
        };
        assert_eq!(config.socket_addr_string(), "[::]:2000");
        assert!(config.socket_addr_string().parse::<std::net::SocketAddr>().is_ok());

        let config = Config {
            bind_addr: "[::1]".to_string(),
            port: 4000,
            ..Config::default()
        };
        assert_eq!(config.socket_addr_string(), "[::1]:4000");
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = Config::default()
            .with_overrides(lookup(&[
                (ENV_BIND_ADDR, "127.0.0.1"),
                (ENV_PORT, "4000"),
                (ENV_ECHO_TO_SENDER, "off"),
            ]))
            .unwrap();

        assert_eq!(
            config,
            Config {
                bind_addr: "127.0.0.1".to_string(),
                port: 4000,
                echo_to_sender: false,
            }
        );
    }

    #[test]
    fn bad_env_port_is_an_invalid_port() {
        let err = Config::default()
            .with_overrides(lookup(&[(ENV_PORT, "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }

    #[test]
    fn bad_echo_flag_names_the_key() {
        let err = Config::default()
            .with_overrides(lookup(&[(ENV_ECHO_TO_SENDER, "maybe")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value \"maybe\" for CHAT_ECHO_TO_SENDER"
        );
    }

    #[test]
    fn port_argument_wins() {
        let config = Config::default().with_port_arg("2525").unwrap();
        assert_eq!(config.port, 2525);
        assert!(Config::default().with_port_arg("0").is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("port = 3000\n").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert!(config.echo_to_sender);
    }
}
