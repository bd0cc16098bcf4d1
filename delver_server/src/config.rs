// Server settings.
//
// Loadable from JSON (`ServerConfig::from_json` / `load`); any field left
// out keeps its default. Durations are integer milliseconds.

use std::path::Path;
use std::time::Duration;

use delver_protocol::{ConfigError, DEFAULT_PORT, ServerVersion, config};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// 0 lets the OS pick a free port (tests).
    pub port: u16,
    /// Receive timeout until the client has authenticated.
    pub handshake_timeout_ms: u64,
    /// Receive timeout once authenticated; an idle client is dropped.
    pub idle_timeout_ms: u64,
    /// Unparseable messages tolerated per session before closing it.
    pub max_corrupt_messages: u32,
    /// How long after an unclean drop a fresh login counts as a reconnect.
    pub reconnect_grace_ms: u64,
    /// Reported to clients on successful authentication.
    pub version: ServerVersion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            handshake_timeout_ms: 10_000,
            idle_timeout_ms: 30 * 60 * 1000,
            max_corrupt_messages: 3,
            reconnect_grace_ms: 60_000,
            version: ServerVersion {
                major: 0,
                minor: 1,
                patchlevel: 0,
            },
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        config::from_json(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        config::load(path)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7114);
        assert_eq!(config.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.max_corrupt_messages, 3);
    }

    #[test]
    fn version_can_be_overridden_from_json() {
        let config =
            ServerConfig::from_json(r#"{"port": 0, "version": {"major": 4, "minor": 3}}"#)
                .unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.version.major, 4);
        assert_eq!(config.version.patchlevel, 0);
        assert_eq!(config.handshake_timeout_ms, 10_000);
    }
}
