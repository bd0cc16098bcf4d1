// Why a server session stops.
//
// `SessionAbort` is returned from every `GameUi` interactive call so the
// game engine unwinds with `?` when the client goes away, asks to shut
// down, or breaks the protocol mid-game.

use delver_protocol::{ProtocolError, TransportError, WireError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionAbort {
    /// The socket failed, timed out or was closed. The client may come back
    /// and reconnect.
    #[error("client connection lost: {0}")]
    ClientGone(#[from] TransportError),
    /// The client sent `shutdown`.
    #[error("client requested shutdown")]
    Shutdown,
    /// The client broke the protocol; the session is closed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<WireError> for SessionAbort {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Transport(e) => SessionAbort::ClientGone(e),
            WireError::Protocol(e) => SessionAbort::Protocol(e),
        }
    }
}

impl From<serde_json::Error> for SessionAbort {
    fn from(err: serde_json::Error) -> Self {
        SessionAbort::Protocol(err.into())
    }
}
