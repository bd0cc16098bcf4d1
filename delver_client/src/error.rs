// Errors surfaced by `Connection` calls.
//
// Ordinary game outcomes (bad password, game over, game in use) are not
// errors; they come back as `AuthResult`/`PlayResult` values. A `CallError`
// means the call itself could not be completed.

use delver_protocol::{AuthResult, ProtocolError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// No live connection and no saved credentials to reconnect with.
    #[error("not connected")]
    NotConnected,
    /// Every reconnection attempt failed; the connection is now down.
    #[error("server unreachable after {attempts} reconnection attempts")]
    Network { attempts: u32 },
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server sent something the client cannot accept. The connection
    /// has been torn down.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The server reported an error it did not recover from.
    #[error("server error: {message}")]
    Server { message: String, retryable: bool },
    /// A non-idempotent request was written before the link failed, so the
    /// server may or may not have acted on it.
    #[error("`{tag}` was interrupted by a reconnection; its outcome is unknown")]
    Interrupted { tag: String },
    /// Saved credentials were refused while reconnecting.
    #[error("authentication rejected: {0:?}")]
    AuthRejected(AuthResult),
}
