// TCP listener and session threads.
//
// Architecture: thread-per-connection.
//
// - **Listener thread** (`TcpListener::accept()` loop): the listener is
//   non-blocking so the loop can check `keep_running` every 50 ms. Each
//   accepted stream becomes a `ServerSession` on its own named thread.
// - **Session threads**: own their socket and run until the client leaves.
//   Sessions share only the `ServerContext` (config, collaborators,
//   presence table, live-connection registry).
//
// `LiveConnections` keeps a cloned handle of every open socket so the
// server can cut one session (a re-login supersedes the user's older
// session) or all of them at once (`ServerHandle::stop`, and tests that
// simulate a network failure). Shutting a socket down makes the owning
// session's blocking read fail, which unwinds it normally.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use delver_protocol::Transport;
use tracing::{error, info, warn};

use crate::backend::{Accounts, GameBackend};
use crate::config::ServerConfig;
use crate::presence::Presence;
use crate::session::{ServerContext, ServerSession};

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    live: LiveConnections,
}

impl ServerHandle {
    /// Stop accepting, wait for the listener to exit and drop every open
    /// connection.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
        self.live.disconnect_all();
    }

    pub fn connections(&self) -> LiveConnections {
        self.live.clone()
    }
}

/// Sockets of the sessions currently running, by session id.
#[derive(Clone, Debug, Default)]
pub struct LiveConnections {
    streams: Arc<Mutex<HashMap<u64, TcpStream>>>,
}

impl LiveConnections {
    fn insert(&self, id: u64, stream: TcpStream) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.insert(id, stream);
    }

    pub(crate) fn remove(&self, id: u64) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.remove(&id);
    }

    pub fn count(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Shut down the socket of session `id`. Returns false if that session
    /// has already ended.
    pub fn disconnect(&self, id: u64) -> bool {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        match streams.get(&id) {
            Some(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    /// Shut down every open socket. The sessions notice on their next read
    /// and clean up after themselves.
    pub fn disconnect_all(&self) {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        for stream in streams.values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping
/// it and the actual bound address (useful when port 0 is used to let the
/// OS pick a free port).
pub fn start_server(
    config: ServerConfig,
    accounts: Arc<dyn Accounts>,
    backend: Arc<dyn GameBackend>,
) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let live = LiveConnections::default();
    let ctx = Arc::new(ServerContext {
        presence: Presence::new(config.reconnect_grace()),
        config,
        accounts,
        backend,
        live: live.clone(),
    });
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::Builder::new()
        .name("delver-listener".into())
        .spawn(move || accept_loop(listener, ctx, keep_running_clone))?;
    info!(%addr, "server listening");

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
            live,
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>, keep_running: Arc<AtomicBool>) {
    let mut next_id = 0u64;
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                next_id += 1;
                spawn_session(&ctx, next_id, stream, peer);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!(error = %e, "accept failed; listener exiting");
                break;
            }
        }
    }
    info!("listener stopped");
}

fn spawn_session(ctx: &Arc<ServerContext>, id: u64, stream: TcpStream, peer: SocketAddr) {
    let handle = match stream.try_clone() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(%peer, error = %e, "could not register connection");
            return;
        }
    };
    let transport = match Transport::from_stream(stream, ctx.config.handshake_timeout()) {
        Ok(transport) => transport,
        Err(e) => {
            warn!(%peer, error = %e, "could not set up connection");
            return;
        }
    };
    ctx.live.insert(id, handle);

    let session = ServerSession::new(id, peer.to_string(), transport, ctx.clone());
    let spawned = thread::Builder::new()
        .name(format!("delver-session-{id}"))
        .spawn(move || session.run());
    if let Err(e) = spawned {
        error!(%peer, error = %e, "could not spawn session thread");
        ctx.live.remove(id);
    }
}
