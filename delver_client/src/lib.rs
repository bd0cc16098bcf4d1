// delver_client - the remote-play client connection.
//
// A `Connection` logs into a Delver server, issues commands and services
// the callbacks the server sends while a command runs (prompts, menus, map
// updates). The presentation layer plugs in through the `ClientUi` trait;
// this crate never draws anything itself.
//
// Module overview:
// - `connection.rs`: `Connection` state, connect/register/disconnect and the
//                    reconnection loop.
// - `correlator.rs`: `Connection::call`, the request/response loop with
//                    nested callbacks; per-command `ResumePolicy` table.
// - `dispatch.rs`:   `ClientUi` / `PromptQueries` traits and the callback
//                    table.
// - `api.rs`:        Typed wrappers (`play_game`, `list_games`, ...).
// - `reconnect.rs`:  `ReconnectPolicy`, `Backoff`, `LinkState`.
// - `config.rs`:     `ClientConfig`.
// - `error.rs`:      `CallError`.
//
// Threading: none. The caller's thread drives the connection; blocking
// happens only in receive (bounded by `recv_timeout_ms`) and in connect.

pub mod api;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod reconnect;

pub use config::ClientConfig;
pub use connection::{Connection, ReconnectContext};
pub use correlator::{Reply, ResumePolicy};
pub use dispatch::{ClientUi, PromptQueries};
pub use error::CallError;
pub use reconnect::{LinkState, ReconnectPolicy};
