// Server command table.
//
// One static entry per client command: its tag, whether it may arrive while
// a callback is outstanding (`out_of_band`), whether it needs a logged-in
// user, and the handler. `ServerSession` looks every incoming message up
// here, both in its top-level loop and while waiting on a callback answer.
//
// Handlers decode their parameters leniently: a payload that does not fit
// the command is logged and answered with `{}` so the client sees its
// reply defaults. Everything the handlers know about games comes from the
// `Accounts` / `GameBackend` collaborators.

use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{
    AuthParams, AuthReply, CodeReply, DescribePosParams, GetOptionsReply, ListGamesParams,
    ListGamesReply, PlayGameParams, RegisterParams, SetOptionParams, StartGameParams,
};
use delver_protocol::{AuthResult, FollowMode, PlayResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::SessionAbort;
use crate::session::ServerSession;

/// What the session does after a handler returns.
pub enum Handled {
    Reply(Value),
    /// Stop serving the connection without replying.
    Close,
}

pub type CommandFn = fn(&mut ServerSession, &Value) -> Result<Handled, SessionAbort>;

pub struct CommandEntry {
    pub name: &'static str,
    /// Accepted while a callback is outstanding.
    pub out_of_band: bool,
    pub requires_auth: bool,
    pub handler: CommandFn,
}

pub static COMMANDS: &[CommandEntry] = &[
    CommandEntry {
        name: tag::AUTH,
        out_of_band: false,
        requires_auth: false,
        handler: on_auth,
    },
    CommandEntry {
        name: tag::REGISTER,
        out_of_band: false,
        requires_auth: false,
        handler: on_register,
    },
    CommandEntry {
        name: tag::START_GAME,
        out_of_band: false,
        requires_auth: true,
        handler: on_start_game,
    },
    CommandEntry {
        name: tag::PLAY_GAME,
        out_of_band: false,
        requires_auth: true,
        handler: on_play_game,
    },
    CommandEntry {
        name: tag::LIST_GAMES,
        out_of_band: false,
        requires_auth: true,
        handler: on_list_games,
    },
    CommandEntry {
        name: tag::GET_OPTIONS,
        out_of_band: false,
        requires_auth: true,
        handler: on_get_options,
    },
    CommandEntry {
        name: tag::SET_OPTION,
        out_of_band: false,
        requires_auth: true,
        handler: on_set_option,
    },
    CommandEntry {
        name: tag::GET_ROLES,
        out_of_band: false,
        requires_auth: false,
        handler: on_get_roles,
    },
    CommandEntry {
        name: tag::GET_DRAWING_INFO,
        out_of_band: false,
        requires_auth: false,
        handler: on_get_drawing_info,
    },
    CommandEntry {
        name: tag::DESCRIBE_POS,
        out_of_band: true,
        requires_auth: true,
        handler: on_describe_pos,
    },
    CommandEntry {
        name: tag::SHUTDOWN,
        out_of_band: true,
        requires_auth: false,
        handler: on_shutdown,
    },
];

pub fn lookup(name: &str) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|entry| entry.name == name)
}

fn params<T: DeserializeOwned>(name: &str, payload: &Value) -> Option<T> {
    match decode_payload(name, payload) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!(tag = %name, error = %e, "malformed command parameters");
            None
        }
    }
}

fn reply<T: Serialize>(payload: &T) -> Result<Handled, SessionAbort> {
    Ok(Handled::Reply(serde_json::to_value(payload)?))
}

fn defaults() -> Result<Handled, SessionAbort> {
    Ok(Handled::Reply(json!({})))
}

fn login_reply(
    session: &mut ServerSession,
    username: &str,
    result: AuthResult,
) -> Result<Handled, SessionAbort> {
    let result = if result.is_success() {
        session.login(username)?
    } else {
        info!(peer = %session.peer(), user = %username, ?result, "login refused");
        result
    };
    let version = result.is_success().then_some(session.ctx.config.version);
    reply(&AuthReply {
        code: result.code(),
        version,
    })
}

fn on_auth(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let Some(p) = params::<AuthParams>(tag::AUTH, payload) else {
        return defaults();
    };
    let result = session.ctx.accounts.authenticate(&p.username, &p.password);
    login_reply(session, &p.username, result)
}

fn on_register(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let Some(p) = params::<RegisterParams>(tag::REGISTER, payload) else {
        return defaults();
    };
    let result = session
        .ctx
        .accounts
        .register(&p.username, &p.password, p.email.as_deref());
    login_reply(session, &p.username, result)
}

fn on_start_game(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::START_GAME)?;
    let Some(p) = params::<StartGameParams>(tag::START_GAME, payload) else {
        return defaults();
    };
    reply(&session.ctx.backend.start_game(&user, &p))
}

fn on_play_game(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::PLAY_GAME)?;
    let Some(p) = params::<PlayGameParams>(tag::PLAY_GAME, payload) else {
        return defaults();
    };
    let Some(mode) = FollowMode::from_code(p.followmode) else {
        warn!(followmode = p.followmode, "unknown follow mode");
        return reply(&CodeReply {
            code: PlayResult::NotFound.code(),
        });
    };
    info!(user = %user, gameid = p.gameid.0, ?mode, "game starting");
    let backend = session.ctx.backend.clone();
    let result = backend.play_game(&user, p.gameid, mode, session)?;
    info!(user = %user, gameid = p.gameid.0, ?result, "game finished");
    reply(&CodeReply {
        code: result.code(),
    })
}

fn on_list_games(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::LIST_GAMES)?;
    let Some(p) = params::<ListGamesParams>(tag::LIST_GAMES, payload) else {
        return defaults();
    };
    let games = session.ctx.backend.list_games(&user, p.completed, p.limit);
    reply(&ListGamesReply { games })
}

fn on_get_options(session: &mut ServerSession, _payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::GET_OPTIONS)?;
    let options = session.ctx.backend.options(&user);
    reply(&GetOptionsReply { options })
}

fn on_set_option(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::SET_OPTION)?;
    let Some(p) = params::<SetOptionParams>(tag::SET_OPTION, payload) else {
        return defaults();
    };
    let code = session.ctx.backend.set_option(&user, &p.name, &p.value);
    reply(&CodeReply { code })
}

fn on_get_roles(session: &mut ServerSession, _payload: &Value) -> Result<Handled, SessionAbort> {
    reply(&session.ctx.backend.roles())
}

fn on_get_drawing_info(
    session: &mut ServerSession,
    _payload: &Value,
) -> Result<Handled, SessionAbort> {
    reply(&session.ctx.backend.drawing_info())
}

fn on_describe_pos(session: &mut ServerSession, payload: &Value) -> Result<Handled, SessionAbort> {
    let user = session.user_name(tag::DESCRIBE_POS)?;
    let Some(p) = params::<DescribePosParams>(tag::DESCRIBE_POS, payload) else {
        return defaults();
    };
    reply(&session.ctx.backend.describe_pos(&user, p.x, p.y))
}

fn on_shutdown(_session: &mut ServerSession, _payload: &Value) -> Result<Handled, SessionAbort> {
    Ok(Handled::Close)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_unique_names() {
        for (i, entry) in COMMANDS.iter().enumerate() {
            assert!(
                COMMANDS[i + 1..].iter().all(|other| other.name != entry.name),
                "duplicate entry for {}",
                entry.name
            );
        }
    }

    #[test]
    fn only_describe_pos_and_shutdown_are_out_of_band() {
        let oob: Vec<_> = COMMANDS
            .iter()
            .filter(|entry| entry.out_of_band)
            .map(|entry| entry.name)
            .collect();
        assert_eq!(oob, [tag::DESCRIBE_POS, tag::SHUTDOWN]);
    }

    #[test]
    fn session_commands_do_not_need_a_login() {
        for name in [tag::AUTH, tag::REGISTER, tag::SHUTDOWN] {
            assert!(!lookup(name).unwrap().requires_auth, "{name}");
        }
        for name in [tag::PLAY_GAME, tag::START_GAME, tag::SET_OPTION] {
            assert!(lookup(name).unwrap().requires_auth, "{name}");
        }
        assert!(lookup("exit_game").is_none());
    }
}
