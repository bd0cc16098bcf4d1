// One client connection on the server.
//
// `ServerSession` owns the socket and runs on its own thread. At the top
// level it is a plain request loop: receive a command, look it up in the
// command table (`dispatch.rs`), answer it. The interesting case is
// `play_game`: the game engine runs inside the handler and talks to the
// player through `GameUi`, which this type implements. An interactive
// `GameUi` call is a nested callback:
//
//   1. send `{callback: params}`, with queued notifications attached
//   2. receive until the client answers with the same tag
//      - out-of-band-safe commands (`describe_pos`, `shutdown`) are
//        serviced in place
//      - any other command is out of sequence: fatal
//   3. decode the answer; malformed answers fall back to the reply default
//
// Display-only `GameUi` calls (`update_screen`, `print_message`, ...) are
// queued and ride on the next outgoing message in the `display` list, so a
// turn that redraws the map, prints two messages and prompts costs one
// message, not four.
//
// `update_screen` keeps the last frame and cursor sent. Identical frames
// with an unchanged cursor are not sent at all; a cursor-only move is sent
// with the "unchanged" delta.
//
// Errors: unparseable messages get `server_error {error: false}` (the client
// resends) up to `max_corrupt_messages`; every other protocol violation
// sends `server_error {error: true}` and closes the session.

use std::mem;
use std::sync::Arc;

use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{
    CodeReply, CommandReply, Empty, GetdirParams, GetlineParams, GetlineReply, GetposParams,
    GetposReply, LevelChangedParams, LoadProgressParams, MenuParams, MenuReply, ObjectsParams,
    ObjectsReply, PlayerStatus, PrintMessageParams, QueryKeyParams, QueryKeyReply,
    RawPrintParams, RequestCommandParams, ServerErrorParams, UpdateScreenParams, YnParams,
    YnReply,
};
use delver_protocol::{
    AuthResult, DisplayDelta, DisplayFrame, Message, Notification, ProtocolError, Transport,
    WireError, delta,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::backend::{Accounts, GameBackend, GameUi};
use crate::config::ServerConfig;
use crate::dispatch;
use crate::error::SessionAbort;
use crate::presence::Presence;
use crate::server::LiveConnections;

const ESC: char = '\x1b';

/// State shared by every session of one server.
pub(crate) struct ServerContext {
    pub config: ServerConfig,
    pub accounts: Arc<dyn Accounts>,
    pub backend: Arc<dyn GameBackend>,
    pub presence: Presence,
    pub live: LiveConnections,
}

/// Whether the top-level loop keeps going after a command.
pub(crate) enum Flow {
    Continue,
    Close,
}

pub struct ServerSession {
    id: u64,
    peer: String,
    transport: Transport,
    pub(crate) ctx: Arc<ServerContext>,
    pub(crate) user: Option<String>,
    /// The last frame sent to the client, and the cursor with it.
    display: DisplayFrame,
    cursor: Option<(i32, i32)>,
    queued: Vec<Notification>,
    corrupt: u32,
}

impl ServerSession {
    pub(crate) fn new(id: u64, peer: String, transport: Transport, ctx: Arc<ServerContext>) -> Self {
        Self {
            id,
            peer,
            transport,
            ctx,
            user: None,
            display: DisplayFrame::new(),
            cursor: None,
            queued: Vec::new(),
            corrupt: 0,
        }
    }

    /// Serve the connection until the client leaves or breaks the protocol.
    pub fn run(mut self) {
        info!(peer = %self.peer, session = self.id, "session started");
        let outcome = self.serve();
        let clean = matches!(outcome, Ok(()) | Err(SessionAbort::Shutdown));
        match &outcome {
            Ok(()) | Err(SessionAbort::Shutdown) => {
                info!(peer = %self.peer, user = ?self.user, "session closed by client");
            }
            Err(SessionAbort::ClientGone(e)) => {
                info!(peer = %self.peer, user = ?self.user, error = %e, "client connection lost");
            }
            Err(SessionAbort::Protocol(e)) => {
                error!(peer = %self.peer, user = ?self.user, error = %e, "protocol violation; closing session");
                let notice = ServerErrorParams {
                    error: true,
                    message: e.to_string(),
                };
                if let Ok(msg) = Message::typed(tag::SERVER_ERROR, &notice) {
                    let _ = self.transport.send(&msg);
                }
            }
        }
        if let Some(user) = self.user.take() {
            self.ctx.presence.detach(&user, self.id, clean);
        }
        self.transport.shutdown();
        self.ctx.live.remove(self.id);
    }

    fn serve(&mut self) -> Result<(), SessionAbort> {
        loop {
            let msg = self.receive()?;
            if let Flow::Close = self.service(msg)? {
                return Ok(());
            }
        }
    }

    /// Run one command through the table and send its reply.
    fn service(&mut self, msg: Message) -> Result<Flow, SessionAbort> {
        let entry = dispatch::lookup(&msg.tag)
            .ok_or_else(|| ProtocolError::UnknownCommand(msg.tag.clone()))?;
        if entry.requires_auth && self.user.is_none() {
            return Err(ProtocolError::Unauthenticated(msg.tag).into());
        }
        match (entry.handler)(self, &msg.payload)? {
            dispatch::Handled::Reply(payload) => {
                self.send(Message::new(msg.tag, payload))?;
                Ok(Flow::Continue)
            }
            dispatch::Handled::Close => Ok(Flow::Close),
        }
    }

    /// Receive the next parseable message, answering unparseable ones with a
    /// retryable `server_error`.
    fn receive(&mut self) -> Result<Message, SessionAbort> {
        loop {
            match self.transport.receive() {
                Ok(msg) => return Ok(msg),
                Err(WireError::Transport(e)) => return Err(e.into()),
                Err(WireError::Protocol(e @ (ProtocolError::Json(_) | ProtocolError::Malformed(_)))) => {
                    self.corrupt += 1;
                    if self.corrupt > self.ctx.config.max_corrupt_messages {
                        return Err(e.into());
                    }
                    warn!(peer = %self.peer, count = self.corrupt, error = %e, "unparseable message");
                    let notice = ServerErrorParams {
                        error: false,
                        message: e.to_string(),
                    };
                    self.send(Message::typed(tag::SERVER_ERROR, &notice)?)?;
                }
                Err(WireError::Protocol(e)) => return Err(e.into()),
            }
        }
    }

    /// Send a message with every queued notification attached.
    pub(crate) fn send(&mut self, msg: Message) -> Result<(), SessionAbort> {
        let notifications = mem::take(&mut self.queued);
        self.transport.send(&msg.with_notifications(notifications))?;
        Ok(())
    }

    fn queue<T: Serialize>(&mut self, name: &str, payload: &T) {
        match Notification::typed(name, payload) {
            Ok(note) => self.queued.push(note),
            Err(e) => warn!(tag = %name, error = %e, "dropping notification"),
        }
    }

    /// Send a nested callback and wait for the client's answer.
    fn callback<P: Serialize, R: DeserializeOwned + Default>(
        &mut self,
        name: &str,
        params: &P,
    ) -> Result<R, SessionAbort> {
        self.send(Message::typed(name, params)?)?;
        loop {
            let msg = self.receive()?;
            if msg.tag == name {
                return Ok(decode_payload(name, &msg.payload).unwrap_or_else(|e| {
                    warn!(tag = %name, error = %e, "malformed callback answer");
                    R::default()
                }));
            }
            match dispatch::lookup(&msg.tag) {
                Some(entry) if entry.out_of_band => {
                    debug!(tag = %msg.tag, pending = %name, "servicing out-of-band command");
                    if let Flow::Close = self.service(msg)? {
                        return Err(SessionAbort::Shutdown);
                    }
                }
                Some(_) => {
                    return Err(ProtocolError::OutOfSequence {
                        tag: msg.tag,
                        expected: name.into(),
                    }
                    .into());
                }
                None => return Err(ProtocolError::UnknownCommand(msg.tag).into()),
            }
        }
    }

    /// Mark the session as logged in, closing any older session of the same
    /// user. Returns the result to report.
    pub(crate) fn login(&mut self, username: &str) -> Result<AuthResult, SessionAbort> {
        if let Some(previous) = self.user.take() {
            self.ctx.presence.detach(&previous, self.id, true);
        }
        let login = self.ctx.presence.attach(username, self.id);
        for old in login.superseded {
            if self.ctx.live.disconnect(old) {
                info!(user = %username, session = old, "closing superseded session");
            }
        }
        self.user = Some(username.to_owned());
        self.transport.set_recv_timeout(self.ctx.config.idle_timeout())?;
        info!(peer = %self.peer, user = %username, resumed = login.resumed, "logged in");
        Ok(if login.resumed {
            AuthResult::SuccessReconnect
        } else {
            AuthResult::SuccessNew
        })
    }

    /// The logged-in user. The command table already rejects
    /// unauthenticated use of commands that need one.
    pub(crate) fn user_name(&self, command: &str) -> Result<String, SessionAbort> {
        self.user
            .clone()
            .ok_or_else(|| ProtocolError::Unauthenticated(command.into()).into())
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

fn to_char(code: i32) -> Option<char> {
    u32::try_from(code).ok().and_then(char::from_u32)
}

impl GameUi for ServerSession {
    fn request_command(
        &mut self,
        params: &RequestCommandParams,
    ) -> Result<CommandReply, SessionAbort> {
        self.callback(tag::REQUEST_COMMAND, params)
    }

    fn display_menu(&mut self, params: &MenuParams) -> Result<MenuReply, SessionAbort> {
        self.callback(tag::DISPLAY_MENU, params)
    }

    fn display_objects(&mut self, params: &ObjectsParams) -> Result<ObjectsReply, SessionAbort> {
        self.callback(tag::DISPLAY_OBJECTS, params)
    }

    fn yn(&mut self, query: &str, choices: &str, default: char) -> Result<char, SessionAbort> {
        let params = YnParams {
            query: query.into(),
            set: choices.into(),
            def: default.to_string(),
        };
        let reply: YnReply = self.callback(tag::YN, &params)?;
        Ok(to_char(reply.code)
            .filter(|c| *c != '\0')
            .unwrap_or(default))
    }

    fn getline(&mut self, query: &str) -> Result<String, SessionAbort> {
        let params = GetlineParams {
            query: query.into(),
        };
        let reply: GetlineReply = self.callback(tag::GETLINE, &params)?;
        Ok(reply.line)
    }

    fn getpos(&mut self, params: &GetposParams) -> Result<GetposReply, SessionAbort> {
        self.callback(tag::GETPOS, params)
    }

    fn getdir(&mut self, query: &str, restricted: bool) -> Result<char, SessionAbort> {
        let params = GetdirParams {
            query: query.into(),
            restricted,
        };
        let reply: CodeReply = self.callback(tag::GETDIR, &params)?;
        Ok(to_char(reply.code).filter(|c| *c != '\0').unwrap_or(ESC))
    }

    fn query_key(&mut self, params: &QueryKeyParams) -> Result<QueryKeyReply, SessionAbort> {
        self.callback(tag::QUERY_KEY, params)
    }

    fn update_screen(&mut self, frame: &DisplayFrame, ux: i32, uy: i32) {
        let cursor = (ux, uy);
        let dbuf = match delta::encode(&self.display, frame) {
            Some(delta) => delta,
            None if self.cursor == Some(cursor) => return,
            None => DisplayDelta::Unchanged,
        };
        self.display.clone_from(frame);
        self.cursor = Some(cursor);
        self.queue(
            tag::UPDATE_SCREEN,
            &UpdateScreenParams {
                ux,
                uy,
                dbuf: dbuf.to_value(),
            },
        );
    }

    fn print_message(&mut self, turn: i64, msg: &str) {
        self.queue(
            tag::PRINT_MESSAGE,
            &PrintMessageParams {
                turn,
                msg: msg.into(),
            },
        );
    }

    fn update_status(&mut self, status: &PlayerStatus) {
        self.queue(tag::UPDATE_STATUS, status);
    }

    fn level_changed(&mut self, display_mode: i32) {
        self.queue(tag::LEVEL_CHANGED, &LevelChangedParams { display_mode });
    }

    fn delay_output(&mut self) {
        self.queue(tag::DELAY_OUTPUT, &Empty {});
    }

    fn raw_print(&mut self, message: &str) -> Result<(), SessionAbort> {
        let params = RawPrintParams {
            message: message.into(),
        };
        self.send(Message::typed(tag::RAW_PRINT, &params)?)
    }

    fn load_progress(&mut self, progress: i32) -> Result<(), SessionAbort> {
        self.send(Message::typed(
            tag::LOAD_PROGRESS,
            &LoadProgressParams { progress },
        )?)
    }

    fn server_cancel(&mut self) -> Result<(), SessionAbort> {
        self.send(Message::empty(tag::SERVER_CANCEL))
    }
}
