// The client's connection to a game server.
//
// `Connection` owns all mutable client protocol state: the transport, the
// saved credentials used to reconnect, the link state, the negotiated server
// version and the client's copy of the map (`DisplayFrame`). It is driven by
// one thread; every operation takes `&mut self`, so at most one request is
// ever outstanding.
//
// Lifecycle:
// - `connect` / `register` open a socket and authenticate. Credentials are
//   saved only when the server accepts them.
// - Calls (`correlator.rs`, `api.rs`) run over the live transport. When it
//   fails they call `reconnect`, which retries `auth` with the saved
//   credentials under `Backoff` until it succeeds or the budget is spent.
// - `disconnect` (also run on drop) tells the server and forgets the
//   credentials.
//
// The connect handshake runs through the same correlator as every other
// call, with `in_handshake` set. While it is set a transport failure is
// returned to the caller instead of starting another reconnection, so
// reconnection never nests.
//
// Every new transport starts with an empty `DisplayFrame`, matching the
// fresh frame of the new server session, so the next `update_screen`
// resynchronizes the whole map.

use std::thread;

use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{AuthParams, AuthReply, RegisterParams};
use delver_protocol::{AuthResult, DisplayFrame, Message, ProtocolError, ServerVersion, Transport};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::ClientConfig;
use crate::correlator::Reply;
use crate::dispatch::ClientUi;
use crate::error::CallError;
use crate::reconnect::{Backoff, LinkState};

/// What `reconnect` needs to re-establish a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectContext {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub struct Connection<U: ClientUi> {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Option<Transport>,
    pub(crate) context: Option<ReconnectContext>,
    pub(crate) state: LinkState,
    pub(crate) server_version: Option<ServerVersion>,
    pub(crate) in_handshake: bool,
    pub(crate) display: DisplayFrame,
    pub(crate) ui: U,
}

impl<U: ClientUi> Connection<U> {
    pub fn new(config: ClientConfig, ui: U) -> Self {
        Self {
            config,
            transport: None,
            context: None,
            state: LinkState::Disconnected,
            server_version: None,
            in_handshake: false,
            display: DisplayFrame::new(),
            ui,
        }
    }

    /// Connect to the configured server and log in.
    ///
    /// Rejected credentials and an unreachable server are ordinary results
    /// (`UnknownUser`, `BadPassword`, `NoConnection`), not errors.
    pub fn connect(&mut self, username: &str, password: &str) -> Result<AuthResult, CallError> {
        let params = AuthParams {
            username: username.into(),
            password: password.into(),
        };
        let payload = serde_json::to_value(&params).map_err(ProtocolError::from)?;
        self.open_session(tag::AUTH, payload, username, password)
    }

    /// Create an account on the configured server and log in as it.
    ///
    /// Registration is not idempotent: if the link drops after the request
    /// was sent, this returns `CallError::Interrupted` rather than guessing.
    pub fn register(
        &mut self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<AuthResult, CallError> {
        let params = RegisterParams {
            username: username.into(),
            password: password.into(),
            email: email.map(str::to_owned),
        };
        let payload = serde_json::to_value(&params).map_err(ProtocolError::from)?;
        self.open_session(tag::REGISTER, payload, username, password)
    }

    fn open_session(
        &mut self,
        command: &str,
        payload: Value,
        username: &str,
        password: &str,
    ) -> Result<AuthResult, CallError> {
        if self.transport.is_some() {
            self.disconnect();
        }
        let context = ReconnectContext {
            host: self.config.host.clone(),
            port: self.config.port,
            username: username.into(),
            password: password.into(),
        };

        let result = match self.handshake(&context, command, payload) {
            Ok(result) => result,
            Err(CallError::Transport(e)) => {
                warn!(host = %context.host, port = context.port, error = %e, "cannot reach server");
                AuthResult::NoConnection
            }
            Err(e) => return Err(e),
        };

        if result.is_success() {
            self.context = Some(context);
            self.state = LinkState::Connected;
        }
        info!(user = %username, ?result, "authentication finished");
        Ok(result)
    }

    /// Open a fresh transport and run `auth`/`register` over it.
    ///
    /// On success the transport stays installed. On rejection it is closed.
    fn handshake(
        &mut self,
        context: &ReconnectContext,
        command: &str,
        payload: Value,
    ) -> Result<AuthResult, CallError> {
        let transport = Transport::connect(
            &context.host,
            context.port,
            self.config.connect_timeout(),
            self.config.recv_timeout(),
        )?;
        self.install_transport(transport);

        self.in_handshake = true;
        let outcome = self.call(command, payload);
        self.in_handshake = false;

        let value = match outcome {
            Ok(Reply::Complete(value)) => value,
            Ok(Reply::Restart) => {
                self.drop_transport();
                return Err(CallError::Interrupted {
                    tag: command.into(),
                });
            }
            Err(e) => {
                self.drop_transport();
                return Err(e);
            }
        };

        let reply: AuthReply = decode_payload(command, &value)?;
        let result = AuthResult::from_code(reply.code).ok_or_else(|| ProtocolError::BadPayload {
            tag: command.into(),
            reason: format!("unknown result code {}", reply.code),
        })?;
        if result.is_success() {
            self.server_version = reply.version;
        } else {
            self.drop_transport();
        }
        Ok(result)
    }

    /// Re-establish the session after a transport failure.
    ///
    /// Not reentrant: refuses to run while a handshake is in progress.
    pub(crate) fn reconnect(&mut self) -> Result<(), CallError> {
        self.drop_transport();
        if self.in_handshake {
            return Err(CallError::NotConnected);
        }
        let Some(context) = self.context.clone() else {
            self.state = LinkState::Disconnected;
            return Err(CallError::NotConnected);
        };

        let payload = serde_json::to_value(AuthParams {
            username: context.username.clone(),
            password: context.password.clone(),
        })
        .map_err(ProtocolError::from)?;

        let mut backoff = Backoff::new(self.config.reconnect.clone());
        while let Some(delay) = backoff.next_delay() {
            let attempt = backoff.attempts();
            self.state = LinkState::Reconnecting { attempt };
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            match self.handshake(&context, tag::AUTH, payload.clone()) {
                Ok(result) if result.is_success() => {
                    info!(attempt, host = %context.host, "reconnected");
                    self.state = LinkState::Connected;
                    return Ok(());
                }
                Ok(result) => {
                    error!(attempt, ?result, "saved credentials rejected while reconnecting");
                    self.state = LinkState::Disconnected;
                    return Err(CallError::AuthRejected(result));
                }
                Err(e) => warn!(attempt, error = %e, "reconnection attempt failed"),
            }
        }

        let attempts = backoff.attempts();
        error!(attempts, host = %context.host, "giving up on reconnection");
        self.state = LinkState::Disconnected;
        Err(CallError::Network { attempts })
    }

    /// Tell the server we are leaving and forget the saved credentials.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            // Best effort; the server also notices the close.
            let _ = transport.send(&Message::empty(tag::SHUTDOWN));
        }
        self.drop_transport();
        self.context = None;
        self.server_version = None;
        self.state = LinkState::Disconnected;
        info!("disconnected");
    }

    fn install_transport(&mut self, transport: Transport) {
        self.transport = Some(transport);
        self.display.clear();
    }

    /// Close the socket without touching credentials or link state.
    pub(crate) fn drop_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
        self.display.clear();
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && self.state == LinkState::Connected
    }

    pub fn server_version(&self) -> Option<ServerVersion> {
        self.server_version
    }

    /// The client's copy of the map.
    pub fn display(&self) -> &DisplayFrame {
        &self.display
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<U: ClientUi> Drop for Connection<U> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            self.disconnect();
        }
    }
}
