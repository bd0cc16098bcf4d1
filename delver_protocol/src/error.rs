// Error types shared by both ends of the wire.
//
// Two families, matching how the peers react to them:
// - `TransportError`: the byte stream itself failed (I/O error, timeout,
//   clean close). The client feeds these into reconnection; the server ends
//   the session.
// - `ProtocolError`: bytes arrived but do not form a valid message (bad
//   JSON, unknown tag, oversized frame, malformed display delta). Whether the
//   session survives depends on `ProtocolError::is_fatal`.
//
// `WireError` is the union returned by `Transport::receive`, since a single
// receive can fail either way.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// The byte stream failed. Never retried at the framing layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no data within {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
    #[error("not connected")]
    NotConnected,
}

/// A message arrived but could not be accepted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared frame length or unread buffered data exceeds the hard cap.
    #[error("{size} bytes of unread data exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON that is not a well-formed envelope.
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("`{tag}` arrived while waiting for `{expected}`")]
    OutOfSequence { tag: String, expected: String },
    /// Parameters of a known command failed to decode.
    #[error("bad `{tag}` payload: {reason}")]
    BadPayload { tag: String, reason: String },
    #[error("malformed display delta: {0}")]
    BadDelta(String),
    #[error("command `{0}` requires authentication")]
    Unauthenticated(String),
}

impl ProtocolError {
    /// Fatal errors tear the connection down. Bad parameters for a known
    /// command are answered with an empty result instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::BadPayload { .. })
    }
}

/// Either failure mode of a single receive.
#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        WireError::Transport(TransportError::Io(err))
    }
}

/// Failure to load a JSON config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
