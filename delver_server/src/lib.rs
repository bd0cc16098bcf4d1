// delver_server - the server side of Delver remote play.
//
// Accepts TCP connections and runs one `ServerSession` per client. A
// session answers client commands from a static table and, while a game is
// running, turns the engine's `GameUi` calls into nested callbacks to the
// client. Game rules, accounts and save files live behind the `Accounts`
// and `GameBackend` traits, supplied by the embedding program.
//
// Module overview:
// - `server.rs`:   Listener thread, `start_server` / `ServerHandle`,
//                  `LiveConnections` registry.
// - `session.rs`:  `ServerSession`: command loop, callback correlation,
//                  notification queue, `GameUi` impl with display deltas.
// - `dispatch.rs`: Static command table (OOB-safe / requires-auth flags).
// - `backend.rs`:  `Accounts`, `GameBackend` and `GameUi` traits.
// - `presence.rs`: Per-user live/recently-dropped tracking for
//                  `SuccessReconnect`.
// - `config.rs`:   `ServerConfig`.
// - `error.rs`:    `SessionAbort`.
//
// See also: `delver_protocol` for the wire format, `delver_client` for the
// other end.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod presence;
pub mod server;
pub mod session;

pub use backend::{Accounts, GameBackend, GameUi};
pub use config::ServerConfig;
pub use error::SessionAbort;
pub use server::{LiveConnections, ServerHandle, start_server};
pub use session::ServerSession;
