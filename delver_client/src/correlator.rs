// The request/response correlator.
//
// `Connection::call(tag, payload)` sends `{tag: payload}` and keeps
// receiving until the server answers with the same tag. Anything else the
// server sends in the meantime is serviced on the spot:
//
//   1. send the current outgoing message
//   2. receive; apply every notification in its `display` list, in order
//   3. `server_error`: resend (retryable, bounded) or treat the link as lost
//   4. tag == pending tag: done, return the payload
//   5. otherwise look the tag up in the callback table:
//      - interactive: the answer becomes the outgoing message, go to 1.
//        While the UI works on the answer it may ask the server
//        `describe_pos` out of band through `OobChannel`.
//      - display / notice: applied, go to 2
//      - unknown: fatal, tear the connection down
//
// Nesting is a loop over the mutable outgoing message, not recursion: a
// `yn` prompt inside `play_game` replaces the outgoing message with the
// `yn` answer while the pending tag stays `play_game`, so the server's
// eventual `{"play_game": ...}` still completes the call.
//
// When the link is lost, the connection reconnects and then follows the
// command's `ResumePolicy` (see `COMMANDS`). `play_game` does not try to
// resume mid-game: the server is authoritative, so the call returns
// `Reply::Restart` and the caller simply issues `play_game` again.

use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{DescribePosParams, DescribePosReply, ServerErrorParams};
use delver_protocol::{Message, Notification, ProtocolError, Transport, WireError};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::dispatch::{self, CallbackKind, ClientUi, NoQueries, PromptQueries, Scope};
use crate::error::CallError;
use crate::reconnect::LinkState;

/// Outcome of a call that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply<T> {
    /// The server answered.
    Complete(T),
    /// The link was lost and re-established mid-call; the caller must issue
    /// the whole operation again.
    Restart,
}

impl<T> Reply<T> {
    pub fn map<V>(self, f: impl FnOnce(T) -> V) -> Reply<V> {
        match self {
            Reply::Complete(value) => Reply::Complete(f(value)),
            Reply::Restart => Reply::Restart,
        }
    }
}

/// What a call does after the connection has been re-established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Return `Reply::Restart` to the caller.
    Restart,
    /// Resend the original request; repeating it is harmless.
    Resend,
    /// Resend only if the request never left this side; otherwise fail with
    /// `CallError::Interrupted`.
    Abandon,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub resume: ResumePolicy,
}

/// Every request the client may originate.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: tag::AUTH,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::REGISTER,
        resume: ResumePolicy::Abandon,
    },
    CommandSpec {
        name: tag::START_GAME,
        resume: ResumePolicy::Abandon,
    },
    CommandSpec {
        name: tag::PLAY_GAME,
        resume: ResumePolicy::Restart,
    },
    CommandSpec {
        name: tag::LIST_GAMES,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::GET_OPTIONS,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::SET_OPTION,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::GET_ROLES,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::GET_DRAWING_INFO,
        resume: ResumePolicy::Resend,
    },
    CommandSpec {
        name: tag::DESCRIBE_POS,
        resume: ResumePolicy::Resend,
    },
];

pub fn command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// The one request awaiting its terminal response.
struct PendingRequest<'a> {
    tag: &'a str,
    resume: ResumePolicy,
    /// The original request was fully written at least once on the current
    /// transport.
    delivered: bool,
}

/// Why an exchange stopped short of a reply.
enum Interruption {
    /// The link is unusable; reconnect and apply the resume policy.
    Lost(CallError),
    /// Unrecoverable; the connection has been torn down.
    Fatal(CallError),
}

/// What to do with one received message.
enum Step {
    Complete(Value),
    Send(Message),
    Wait,
}

impl<U: ClientUi> Connection<U> {
    /// Run one request to completion, servicing nested callbacks.
    pub fn call(&mut self, tag: &str, payload: Value) -> Result<Reply<Value>, CallError> {
        let spec = command(tag).ok_or_else(|| ProtocolError::UnknownCommand(tag.into()))?;
        let request = Message::new(tag, payload);
        let mut pending = PendingRequest {
            tag,
            resume: spec.resume,
            delivered: false,
        };
        let mut outgoing = request.clone();
        let mut reconnects = 0;

        loop {
            let lost = match self.exchange(&mut pending, &mut outgoing) {
                Ok(value) => return Ok(Reply::Complete(value)),
                Err(Interruption::Fatal(e)) => {
                    self.teardown(&e);
                    return Err(e);
                }
                Err(Interruption::Lost(e)) => e,
            };

            if self.in_handshake {
                // The reconnect loop owns recovery; report a failed attempt.
                return Err(match (pending.resume, pending.delivered) {
                    (ResumePolicy::Abandon, true) => CallError::Interrupted { tag: tag.into() },
                    _ => lost,
                });
            }

            warn!(tag = %tag, error = %lost, "link lost during call");
            reconnects += 1;
            if reconnects > self.config.reconnect.max_attempts {
                self.drop_transport();
                return Err(CallError::Network {
                    attempts: reconnects - 1,
                });
            }
            self.reconnect()?;

            match pending.resume {
                ResumePolicy::Restart => return Ok(Reply::Restart),
                ResumePolicy::Abandon if pending.delivered => {
                    return Err(CallError::Interrupted { tag: tag.into() });
                }
                ResumePolicy::Abandon | ResumePolicy::Resend => {
                    debug!(tag = %tag, "resending after reconnection");
                    outgoing = request.clone();
                    pending.delivered = false;
                }
            }
        }
    }

    /// Send/receive until the pending tag comes back or the link fails.
    fn exchange(
        &mut self,
        pending: &mut PendingRequest<'_>,
        outgoing: &mut Message,
    ) -> Result<Value, Interruption> {
        let mut server_retries = 0;
        let mut send = true;
        loop {
            if send {
                self.send_current(outgoing)?;
                if outgoing.tag == pending.tag {
                    pending.delivered = true;
                }
            }

            let msg = self.receive_next()?;
            self.apply_notifications(&msg.notifications)?;

            if msg.tag == tag::SERVER_ERROR {
                let params: ServerErrorParams =
                    decode_payload(&msg.tag, &msg.payload).unwrap_or_default();
                if params.error {
                    error!(message = %params.message, "server reported an unrecoverable error");
                    return Err(Interruption::Lost(CallError::Server {
                        message: params.message,
                        retryable: false,
                    }));
                }
                server_retries += 1;
                if server_retries > self.config.max_server_retries {
                    return Err(Interruption::Fatal(CallError::Server {
                        message: params.message,
                        retryable: true,
                    }));
                }
                warn!(
                    tag = %outgoing.tag,
                    retry = server_retries,
                    "server could not parse our message; resending"
                );
                send = true;
                continue;
            }

            match self.step(pending.tag, msg)? {
                Step::Complete(value) => return Ok(value),
                Step::Send(reply) => {
                    *outgoing = reply;
                    send = true;
                }
                Step::Wait => send = false,
            }
        }
    }

    fn step(&mut self, pending_tag: &str, msg: Message) -> Result<Step, Interruption> {
        if msg.tag == pending_tag {
            return Ok(Step::Complete(msg.payload));
        }
        let Some(entry) = dispatch::lookup(&msg.tag) else {
            error!(tag = %msg.tag, pending = %pending_tag, "unknown callback from server");
            return Err(Interruption::Fatal(
                ProtocolError::UnknownCommand(msg.tag).into(),
            ));
        };
        let mut oob = OobChannel {
            transport: self.transport.as_mut(),
            deferred: Vec::new(),
            failure: None,
        };
        let mut scope = Scope {
            display: &mut self.display,
            queries: &mut oob,
        };
        let reply = (entry.handler)(&mut self.ui, &mut scope, &msg.payload);
        let OobChannel {
            deferred, failure, ..
        } = oob;
        if let Some(failure) = failure {
            return Err(failure);
        }
        let reply = reply.map_err(protocol_interruption)?;
        self.apply_notifications(&deferred)?;

        match (entry.kind, reply) {
            (CallbackKind::Interactive, Some(reply)) => {
                Ok(Step::Send(Message::new(msg.tag, reply)))
            }
            (CallbackKind::Interactive, None) => Err(Interruption::Fatal(
                ProtocolError::Malformed(format!("no answer for `{}`", msg.tag)).into(),
            )),
            (CallbackKind::Display | CallbackKind::Notice, _) => Ok(Step::Wait),
        }
    }

    /// Apply a `display` list. Only display-only callbacks may appear there.
    fn apply_notifications(&mut self, notifications: &[Notification]) -> Result<(), Interruption> {
        for note in notifications {
            let entry = dispatch::lookup(&note.tag)
                .ok_or_else(|| ProtocolError::UnknownCommand(note.tag.clone()))
                .map_err(protocol_interruption)?;
            if entry.kind == CallbackKind::Interactive {
                return Err(protocol_interruption(ProtocolError::Malformed(format!(
                    "interactive callback `{}` in display list",
                    note.tag
                ))));
            }
            let mut scope = Scope {
                display: &mut self.display,
                queries: &mut NoQueries,
            };
            (entry.handler)(&mut self.ui, &mut scope, &note.payload)
                .map_err(protocol_interruption)?;
        }
        Ok(())
    }

    fn send_current(&mut self, msg: &Message) -> Result<(), Interruption> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(Interruption::Lost(CallError::NotConnected));
        };
        transport.send(msg).map_err(wire_interruption)
    }

    fn receive_next(&mut self) -> Result<Message, Interruption> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(Interruption::Lost(CallError::NotConnected));
        };
        transport.receive().map_err(wire_interruption)
    }

    fn teardown(&mut self, reason: &CallError) {
        error!(error = %reason, "closing connection");
        self.drop_transport();
        self.state = LinkState::Disconnected;
    }
}

/// The transport, lent to a prompt handler for out-of-band requests. The
/// server answers these without closing the prompt; display lists and
/// `server_cancel` that ride along are held in `deferred` and applied once
/// the handler returns.
struct OobChannel<'a> {
    transport: Option<&'a mut Transport>,
    deferred: Vec<Notification>,
    /// Set on the first failure; later queries are refused.
    failure: Option<Interruption>,
}

impl PromptQueries for OobChannel<'_> {
    fn describe_pos(&mut self, x: i32, y: i32) -> Option<DescribePosReply> {
        if self.failure.is_some() {
            return None;
        }
        let result = match self.transport.as_deref_mut() {
            Some(transport) => describe_pos(transport, x, y, &mut self.deferred),
            None => Err(Interruption::Lost(CallError::NotConnected)),
        };
        match result {
            Ok(reply) => Some(reply),
            Err(failure) => {
                self.failure = Some(failure);
                None
            }
        }
    }
}

fn describe_pos(
    transport: &mut Transport,
    x: i32,
    y: i32,
    deferred: &mut Vec<Notification>,
) -> Result<DescribePosReply, Interruption> {
    let request = Message::typed(tag::DESCRIBE_POS, &DescribePosParams { x, y })
        .map_err(protocol_interruption)?;
    transport.send(&request).map_err(wire_interruption)?;
    loop {
        let mut msg = transport.receive().map_err(wire_interruption)?;
        deferred.append(&mut msg.notifications);
        match msg.tag.as_str() {
            tag::DESCRIBE_POS => {
                return decode_payload(&msg.tag, &msg.payload).map_err(protocol_interruption);
            }
            tag::SERVER_CANCEL => deferred.push(Notification::new(msg.tag, msg.payload)),
            tag::SERVER_ERROR => {
                let params: ServerErrorParams =
                    decode_payload(&msg.tag, &msg.payload).unwrap_or_default();
                return Err(Interruption::Lost(CallError::Server {
                    message: params.message,
                    retryable: !params.error,
                }));
            }
            _ => {
                return Err(Interruption::Fatal(
                    ProtocolError::OutOfSequence {
                        tag: msg.tag,
                        expected: tag::DESCRIBE_POS.into(),
                    }
                    .into(),
                ));
            }
        }
    }
}

fn wire_interruption(err: WireError) -> Interruption {
    match err {
        WireError::Transport(e) => Interruption::Lost(e.into()),
        WireError::Protocol(e) => protocol_interruption(e),
    }
}

/// A bad delta leaves the client's map out of sync with the server's; a
/// fresh session resynchronizes it. Everything else from the server that
/// fails to parse is fatal.
fn protocol_interruption(err: ProtocolError) -> Interruption {
    match err {
        ProtocolError::BadDelta(_) => Interruption::Lost(err.into()),
        _ => Interruption::Fatal(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_policies() {
        assert_eq!(command(tag::PLAY_GAME).unwrap().resume, ResumePolicy::Restart);
        assert_eq!(command(tag::START_GAME).unwrap().resume, ResumePolicy::Abandon);
        assert_eq!(command(tag::REGISTER).unwrap().resume, ResumePolicy::Abandon);
        for name in [
            tag::LIST_GAMES,
            tag::GET_OPTIONS,
            tag::SET_OPTION,
            tag::GET_ROLES,
            tag::GET_DRAWING_INFO,
            tag::DESCRIBE_POS,
        ] {
            assert_eq!(command(name).unwrap().resume, ResumePolicy::Resend, "{name}");
        }
        assert!(command(tag::YN).is_none());
    }

    #[test]
    fn reply_map_keeps_restart() {
        assert_eq!(Reply::Complete(2).map(|v| v * 2), Reply::Complete(4));
        assert_eq!(Reply::<i32>::Restart.map(|v| v * 2), Reply::Restart);
    }
}
