// Collaborator traits the server is built against.
//
// The protocol layer does not know game rules, accounts or save files. A
// deployment supplies:
// - `Accounts`:    credential checks and registration.
// - `GameBackend`: the game engine and its game database.
//
// While `GameBackend::play_game` runs, the engine talks to the player through
// `GameUi`, which `ServerSession` implements by sending callbacks to the
// client. Interactive methods block on the client's answer and return
// `SessionAbort` if the session ends underneath them; engines propagate it
// with `?`. Display methods queue a notification that rides on the next
// outgoing message.
//
// Both traits are `Send + Sync`: one instance is shared by every session
// thread.

use delver_protocol::payload::{
    CommandReply, DescribePosReply, DrawingInfoReply, GameInfo, GetposParams, GetposReply,
    MenuParams, MenuReply, ObjectsParams, ObjectsReply, OptionEntry, PlayerStatus,
    QueryKeyParams, QueryKeyReply, RequestCommandParams, RolesReply, StartGameParams,
    StartGameReply,
};
use delver_protocol::{AuthResult, DisplayFrame, FollowMode, GameId, PlayResult};
use serde_json::Value;

use crate::error::SessionAbort;

pub trait Accounts: Send + Sync {
    /// `SuccessNew` on a match; the session layer upgrades it to
    /// `SuccessReconnect` when appropriate.
    fn authenticate(&self, username: &str, password: &str) -> AuthResult;

    fn register(&self, username: &str, password: &str, email: Option<&str>) -> AuthResult;
}

pub trait GameBackend: Send + Sync {
    fn start_game(&self, user: &str, params: &StartGameParams) -> StartGameReply;

    /// Run the game until it is saved, ends, or the session aborts.
    fn play_game(
        &self,
        user: &str,
        gameid: GameId,
        mode: FollowMode,
        ui: &mut dyn GameUi,
    ) -> Result<PlayResult, SessionAbort>;

    fn list_games(&self, user: &str, completed: bool, limit: u32) -> Vec<GameInfo>;

    fn options(&self, user: &str) -> Vec<OptionEntry>;

    /// Returns a result code, 0 on success.
    fn set_option(&self, user: &str, name: &str, value: &Value) -> i32;

    fn roles(&self) -> RolesReply;

    fn drawing_info(&self) -> DrawingInfoReply;

    /// May be called while `play_game` for the same user is blocked on a
    /// prompt.
    fn describe_pos(&self, user: &str, x: i32, y: i32) -> DescribePosReply;
}

/// The player's screen and keyboard, as seen from the game engine.
pub trait GameUi {
    fn request_command(&mut self, params: &RequestCommandParams)
    -> Result<CommandReply, SessionAbort>;
    fn display_menu(&mut self, params: &MenuParams) -> Result<MenuReply, SessionAbort>;
    fn display_objects(&mut self, params: &ObjectsParams) -> Result<ObjectsReply, SessionAbort>;
    fn yn(&mut self, query: &str, choices: &str, default: char) -> Result<char, SessionAbort>;
    fn getline(&mut self, query: &str) -> Result<String, SessionAbort>;
    fn getpos(&mut self, params: &GetposParams) -> Result<GetposReply, SessionAbort>;
    fn getdir(&mut self, query: &str, restricted: bool) -> Result<char, SessionAbort>;
    fn query_key(&mut self, params: &QueryKeyParams) -> Result<QueryKeyReply, SessionAbort>;

    /// Queue a map update. `frame` is the complete new map; only the
    /// difference from the last one sent goes on the wire.
    fn update_screen(&mut self, frame: &DisplayFrame, ux: i32, uy: i32);
    fn print_message(&mut self, turn: i64, msg: &str);
    fn update_status(&mut self, status: &PlayerStatus);
    fn level_changed(&mut self, display_mode: i32);
    fn delay_output(&mut self);

    /// Sent immediately rather than queued.
    fn raw_print(&mut self, message: &str) -> Result<(), SessionAbort>;
    /// Sent immediately rather than queued.
    fn load_progress(&mut self, progress: i32) -> Result<(), SessionAbort>;
    /// Tell the client to drop whatever prompt it is showing.
    fn server_cancel(&mut self) -> Result<(), SessionAbort>;
}
