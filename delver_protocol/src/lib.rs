// delver_protocol - wire protocol for Delver remote play.
//
// A turn-based game runs on the server; a thin client renders the map and
// answers prompts. This crate is everything both ends must agree on: how
// bytes become messages, what the messages look like, and how the map
// screen is kept in sync cheaply. It is shared by `delver_client` and
// `delver_server` and knows nothing about game rules.
//
// Module overview:
// - `framing.rs`:   4-byte big-endian length prefix + JSON payload;
//                   `FrameBuffer` for incremental reassembly.
// - `transport.rs`: Blocking TCP `Transport` with bounded receive timeout.
// - `message.rs`:   Single-key envelope with optional `display` notification
//                   list; tag constants.
// - `payload.rs`:   Typed parameter/result structs for every message.
// - `types.rs`:     `GameId`, `ServerVersion`, result-code enums.
// - `display.rs`:   `DisplayCell` and the 80x21 `DisplayFrame`.
// - `delta.rs`:     Delta encoding of one frame against the previous one.
// - `error.rs`:     `TransportError`, `ProtocolError`, `WireError`.
// - `config.rs`:    JSON config loading helpers.
//
// Design decisions:
// - **JSON on the wire.** Field names are stable identifiers; payloads are
//   kept as `serde_json::Value` in the envelope and decoded per tag, so an
//   unknown or malformed payload never takes down the envelope parser.
// - **No async runtime.** One blocking thread drives each connection;
//   nested callbacks make the conversation strictly sequential anyway.

pub mod config;
pub mod delta;
pub mod display;
pub mod error;
pub mod framing;
pub mod message;
pub mod payload;
pub mod transport;
pub mod types;

pub use delta::{CellDelta, ColumnDelta, DisplayDelta};
pub use display::{CELL_FIELDS, DisplayCell, DisplayFrame, MAP_COLS, MAP_ROWS};
pub use error::{ConfigError, ProtocolError, TransportError, WireError};
pub use framing::{FrameBuffer, MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{DISPLAY_KEY, Message, Notification, tag};
pub use transport::Transport;
pub use types::{AuthResult, FollowMode, GameId, PlayResult, ServerVersion};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 7114;
