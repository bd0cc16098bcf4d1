// Typed wrappers over `Connection::call`, one per server command.
//
// Each wrapper serializes its parameters, runs the call and decodes the
// reply. An empty `{}` reply (the server's answer to parameters it could not
// decode) comes back as the result type's defaults. Only `play_game` can
// see `Reply::Restart`; for every other command a restart is impossible
// and is reported as `CallError::Interrupted`.

use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{
    CodeReply, DescribePosParams, DescribePosReply, DrawingInfoReply, Empty, GameInfo,
    GetOptionsReply, ListGamesParams, ListGamesReply, OptionEntry, PlayGameParams, RolesReply,
    SetOptionParams, StartGameParams, StartGameReply,
};
use delver_protocol::{FollowMode, GameId, PlayResult, ProtocolError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::correlator::Reply;
use crate::dispatch::ClientUi;
use crate::error::CallError;

impl<U: ClientUi> Connection<U> {
    fn request<P: Serialize, R: DeserializeOwned>(
        &mut self,
        command: &str,
        params: &P,
    ) -> Result<R, CallError> {
        let payload = serde_json::to_value(params).map_err(ProtocolError::from)?;
        match self.call(command, payload)? {
            Reply::Complete(value) => Ok(decode_payload(command, &value)?),
            Reply::Restart => Err(CallError::Interrupted {
                tag: command.into(),
            }),
        }
    }

    /// Create a new character. Not retried if the link drops after sending.
    pub fn start_game(&mut self, params: &StartGameParams) -> Result<StartGameReply, CallError> {
        self.request(tag::START_GAME, params)
    }

    /// Play (or watch) a game until it is saved, ends, or the link drops.
    ///
    /// `Reply::Restart` means the connection was re-established mid-game;
    /// call again to resume from the server's current state. A connection
    /// that could not be re-established is reported as
    /// `PlayResult::NetworkError`.
    pub fn play_game(
        &mut self,
        gameid: GameId,
        followmode: FollowMode,
    ) -> Result<Reply<PlayResult>, CallError> {
        let params = PlayGameParams {
            gameid,
            followmode: followmode.code(),
        };
        let payload = serde_json::to_value(params).map_err(ProtocolError::from)?;
        let reply = match self.call(tag::PLAY_GAME, payload) {
            Ok(reply) => reply,
            Err(CallError::Network { attempts }) => {
                warn!(attempts, "connection lost for good during play");
                return Ok(Reply::Complete(PlayResult::NetworkError));
            }
            Err(e) => return Err(e),
        };
        match reply {
            Reply::Complete(value) => {
                let reply: CodeReply = decode_payload(tag::PLAY_GAME, &value)?;
                let result =
                    PlayResult::from_code(reply.code).ok_or_else(|| ProtocolError::BadPayload {
                        tag: tag::PLAY_GAME.into(),
                        reason: format!("unknown result code {}", reply.code),
                    })?;
                Ok(Reply::Complete(result))
            }
            Reply::Restart => Ok(Reply::Restart),
        }
    }

    /// `play_game`, reissued after each reconnection until it finishes.
    pub fn play_game_to_end(
        &mut self,
        gameid: GameId,
        followmode: FollowMode,
    ) -> Result<PlayResult, CallError> {
        let mut restarts = 0;
        loop {
            match self.play_game(gameid, followmode)? {
                Reply::Complete(result) => return Ok(result),
                Reply::Restart if restarts < self.config.max_restarts => {
                    restarts += 1;
                    info!(gameid = gameid.0, restarts, "resuming game after reconnection");
                }
                Reply::Restart => return Ok(PlayResult::NetworkError),
            }
        }
    }

    pub fn list_games(&mut self, completed: bool, limit: u32) -> Result<Vec<GameInfo>, CallError> {
        let reply: ListGamesReply =
            self.request(tag::LIST_GAMES, &ListGamesParams { completed, limit })?;
        Ok(reply.games)
    }

    pub fn get_options(&mut self) -> Result<Vec<OptionEntry>, CallError> {
        let reply: GetOptionsReply = self.request(tag::GET_OPTIONS, &Empty {})?;
        Ok(reply.options)
    }

    /// Returns the server's result code (0 on success).
    pub fn set_option(&mut self, name: &str, value: Value) -> Result<i32, CallError> {
        let params = SetOptionParams {
            name: name.into(),
            value,
        };
        let reply: CodeReply = self.request(tag::SET_OPTION, &params)?;
        Ok(reply.code)
    }

    pub fn get_roles(&mut self) -> Result<RolesReply, CallError> {
        self.request(tag::GET_ROLES, &Empty {})
    }

    pub fn get_drawing_info(&mut self) -> Result<DrawingInfoReply, CallError> {
        self.request(tag::GET_DRAWING_INFO, &Empty {})
    }

    pub fn describe_pos(&mut self, x: i32, y: i32) -> Result<DescribePosReply, CallError> {
        self.request(tag::DESCRIBE_POS, &DescribePosParams { x, y })
    }
}
