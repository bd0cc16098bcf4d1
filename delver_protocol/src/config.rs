// JSON config loading shared by the client and server config structs.
//
// Config structs are plain serde types with `#[serde(default)]`, so a file
// only needs to name the fields it overrides. Durations are stored as
// integer milliseconds (`*_ms` fields) and exposed as `Duration` through
// accessor methods on each struct.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Parse a config struct from a JSON string.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a JSON config file.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    from_json(&text)
}
