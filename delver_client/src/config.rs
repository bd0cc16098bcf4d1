// Client connection settings.
//
// Loadable from JSON (`ClientConfig::from_json` / `load`); any field left
// out keeps its default. Durations are integer milliseconds.

use std::path::Path;
use std::time::Duration;

use delver_protocol::{ConfigError, DEFAULT_PORT, config};
use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// How long a single receive may block before the link counts as lost.
    pub recv_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Verbatim resends allowed per call after retryable `server_error`s.
    pub max_server_retries: u32,
    /// How many times `play_game_to_end` reissues `play_game` after a
    /// reconnection before giving up.
    pub max_restarts: u32,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            recv_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            max_server_retries: 3,
            max_restarts: 5,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        config::from_json(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        config::load(path)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_the_standard_port() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 7114);
        assert_eq!(config.recv_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = ClientConfig::from_json(
            r#"{"host": "dungeon.example", "reconnect": {"max_attempts": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.host, "dungeon.example");
        assert_eq!(config.port, 7114);
        assert_eq!(config.reconnect.max_attempts, 7);
        assert_eq!(config.reconnect.initial_delay_ms, 500);
    }
}
