// Test-only game and player for end-to-end remote-play tests.
//
// `TinyGame` implements the server collaborators (`Accounts`,
// `GameBackend`) with an in-memory account table and a one-corridor game:
// the player walks east one cell per "move", "look" asks for a map position,
// "save" ends the session with the game intact, and "die" asks for
// confirmation and ends the game for good. Game state lives in the backend,
// not the session, so a game resumed after a reconnection continues where
// the server last saw it.
//
// `ScriptedPlayer` implements `ClientUi` from a queue of commands and
// answers, recording every callback. Asked for a position, it looks the
// proposed one up with `describe_pos` before accepting it. It can cut the
// server's side of the link (`LiveConnections::disconnect_all`) on a chosen
// command prompt to simulate a network failure mid-game.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use delver_client::{ClientConfig, ClientUi, Connection, PromptQueries, ReconnectPolicy};
use delver_protocol::payload::{
    CommandReply, DescribePosReply, DrawingInfoReply, GameInfo, GetposParams, GetposReply,
    MenuParams, MenuReply, ObjectsParams, ObjectsReply, OptionEntry, PlayerStatus,
    QueryKeyParams, QueryKeyReply, RequestCommandParams, RolesReply, StartGameParams,
    StartGameReply, SymbolInfo,
};
use delver_protocol::{AuthResult, DisplayCell, DisplayFrame, FollowMode, GameId, PlayResult};
use delver_server::{
    Accounts, GameBackend, GameUi, LiveConnections, ServerConfig, ServerHandle, SessionAbort,
    start_server,
};
use serde_json::Value;

/// Row of the corridor the player walks along.
pub const CORRIDOR_ROW: usize = 5;

/// Monster glyph used for the player.
pub const PLAYER_GLYPH: u16 = 1;

const FLOOR_GLYPH: u16 = 7;

#[derive(Clone, Debug, Default)]
pub struct GameRecord {
    pub owner: String,
    pub name: String,
    pub turns: i64,
    pub over: bool,
}

#[derive(Default)]
pub struct TinyGame {
    accounts: Mutex<HashMap<String, String>>,
    games: Mutex<HashMap<i64, GameRecord>>,
    options: Mutex<HashMap<String, Value>>,
}

impl TinyGame {
    pub fn with_user(username: &str, password: &str) -> Self {
        let game = Self::default();
        game.accounts
            .lock()
            .unwrap()
            .insert(username.into(), password.into());
        game
    }

    pub fn game(&self, gameid: GameId) -> Option<GameRecord> {
        self.games.lock().unwrap().get(&gameid.0).cloned()
    }

    fn player_x(turns: i64) -> usize {
        usize::try_from(turns).unwrap_or(0) % delver_protocol::MAP_COLS
    }

    fn draw(turns: i64) -> (DisplayFrame, i32, i32) {
        let mut frame = DisplayFrame::new();
        for x in 0..delver_protocol::MAP_COLS {
            frame.set(
                x,
                CORRIDOR_ROW,
                DisplayCell {
                    bg: FLOOR_GLYPH,
                    visible: true,
                    ..DisplayCell::EMPTY
                },
            );
        }
        let x = Self::player_x(turns);
        frame.set(
            x,
            CORRIDOR_ROW,
            DisplayCell {
                bg: FLOOR_GLYPH,
                mon: PLAYER_GLYPH,
                visible: true,
                ..DisplayCell::EMPTY
            },
        );
        (frame, x as i32, CORRIDOR_ROW as i32)
    }

    fn record_turn(&self, gameid: GameId) {
        if let Some(record) = self.games.lock().unwrap().get_mut(&gameid.0) {
            record.turns += 1;
        }
    }

    fn end_game(&self, gameid: GameId) {
        if let Some(record) = self.games.lock().unwrap().get_mut(&gameid.0) {
            record.over = true;
        }
    }
}

impl Accounts for TinyGame {
    fn authenticate(&self, username: &str, password: &str) -> AuthResult {
        match self.accounts.lock().unwrap().get(username) {
            None => AuthResult::UnknownUser,
            Some(stored) if stored == password => AuthResult::SuccessNew,
            Some(_) => AuthResult::BadPassword,
        }
    }

    fn register(&self, username: &str, password: &str, _email: Option<&str>) -> AuthResult {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(username) {
            return AuthResult::BadPassword;
        }
        accounts.insert(username.into(), password.into());
        AuthResult::SuccessNew
    }
}

impl GameBackend for TinyGame {
    fn start_game(&self, user: &str, params: &StartGameParams) -> StartGameReply {
        let mut games = self.games.lock().unwrap();
        let gameid = games.keys().max().copied().unwrap_or(0) + 1;
        games.insert(
            gameid,
            GameRecord {
                owner: user.into(),
                name: params.name.clone(),
                ..GameRecord::default()
            },
        );
        StartGameReply {
            code: 0,
            gameid: GameId(gameid),
        }
    }

    fn play_game(
        &self,
        user: &str,
        gameid: GameId,
        _mode: FollowMode,
        ui: &mut dyn GameUi,
    ) -> Result<PlayResult, SessionAbort> {
        let Some(record) = self.game(gameid) else {
            return Ok(PlayResult::NotFound);
        };
        if record.owner != user {
            return Ok(PlayResult::NotFound);
        }
        if record.over {
            return Ok(PlayResult::GameOver);
        }
        ui.print_message(record.turns, &format!("Welcome back, {}.", record.name));
        loop {
            let turns = self.game(gameid).map_or(0, |record| record.turns);
            let (frame, ux, uy) = Self::draw(turns);
            ui.update_screen(&frame, ux, uy);
            ui.update_status(&PlayerStatus {
                plname: record.name.clone(),
                moves: turns,
                ..PlayerStatus::default()
            });
            let command = ui.request_command(&RequestCommandParams::default())?;
            match command.command.as_str() {
                "move" => self.record_turn(gameid),
                "look" => {
                    let pos = ui.getpos(&GetposParams {
                        x: ux,
                        y: uy,
                        goal: "something to look at".into(),
                        ..GetposParams::default()
                    })?;
                    ui.print_message(turns, &format!("You look at {},{}.", pos.x, pos.y));
                }
                "save" => return Ok(PlayResult::Ok),
                "die" => {
                    if ui.yn("Die?", "yn", 'n')? == 'y' {
                        self.end_game(gameid);
                        ui.print_message(turns, "You die...");
                        ui.delay_output();
                        return Ok(PlayResult::GameOver);
                    }
                }
                other => ui.print_message(turns, &format!("Unknown command '{other}'.")),
            }
        }
    }

    fn list_games(&self, user: &str, completed: bool, limit: u32) -> Vec<GameInfo> {
        let games = self.games.lock().unwrap();
        let mut ids: Vec<_> = games
            .iter()
            .filter(|(_, record)| record.owner == user && record.over == completed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .take(limit as usize)
            .map(|id| GameInfo {
                gameid: GameId(id),
                plname: games[&id].name.clone(),
                moves: games[&id].turns,
                ..GameInfo::default()
            })
            .collect()
    }

    fn options(&self, _user: &str) -> Vec<OptionEntry> {
        let mut options: Vec<_> = self
            .options
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| OptionEntry {
                name: name.clone(),
                value: value.clone(),
                ..OptionEntry::default()
            })
            .collect();
        options.sort_by(|a, b| a.name.cmp(&b.name));
        options
    }

    fn set_option(&self, _user: &str, name: &str, value: &Value) -> i32 {
        self.options
            .lock()
            .unwrap()
            .insert(name.into(), value.clone());
        0
    }

    fn roles(&self) -> RolesReply {
        RolesReply {
            roles: vec!["Archeologist".into(), "Valkyrie".into()],
            races: vec!["human".into(), "dwarf".into()],
            genders: vec!["female".into(), "male".into()],
            aligns: vec!["lawful".into(), "neutral".into()],
        }
    }

    fn drawing_info(&self) -> DrawingInfoReply {
        DrawingInfoReply {
            symbols: vec![
                SymbolInfo {
                    name: "floor".into(),
                    ch: u32::from('.'),
                    color: 7,
                },
                SymbolInfo {
                    name: "player".into(),
                    ch: u32::from('@'),
                    color: 15,
                },
            ],
        }
    }

    fn describe_pos(&self, _user: &str, _x: i32, y: i32) -> DescribePosReply {
        DescribePosReply {
            bgdesc: if y == CORRIDOR_ROW as i32 {
                "floor of a corridor".into()
            } else {
                "solid rock".into()
            },
            ..DescribePosReply::default()
        }
    }
}

/// Start a server backed by `game` on a free localhost port.
pub fn start_tiny_server(game: Arc<TinyGame>) -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        handshake_timeout_ms: 5_000,
        idle_timeout_ms: 10_000,
        ..ServerConfig::default()
    };
    start_server(config, game.clone(), game).unwrap()
}

/// Client settings for tests: localhost, short timeouts, no backoff sleep.
pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".into(),
        port: addr.port(),
        recv_timeout_ms: 5_000,
        connect_timeout_ms: 2_000,
        reconnect: ReconnectPolicy::immediate(3),
        ..ClientConfig::default()
    }
}

/// A player that follows a script.
#[derive(Default)]
pub struct ScriptedPlayer {
    pub commands: VecDeque<String>,
    pub answers: VecDeque<char>,
    pub events: Vec<String>,
    /// Cut the link just before answering this (1-based) command prompt.
    pub kick_at: Option<(usize, LiveConnections)>,
    prompts: usize,
}

impl ScriptedPlayer {
    pub fn new(commands: &[&str], answers: &str) -> Self {
        Self {
            commands: commands.iter().map(|c| (*c).to_owned()).collect(),
            answers: answers.chars().collect(),
            ..Self::default()
        }
    }

    pub fn kick_on_prompt(mut self, prompt: usize, live: LiveConnections) -> Self {
        self.kick_at = Some((prompt, live));
        self
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ClientUi for ScriptedPlayer {
    fn request_command(&mut self, _: &RequestCommandParams) -> CommandReply {
        self.prompts += 1;
        if let Some((prompt, live)) = &self.kick_at {
            if *prompt == self.prompts {
                self.events.push("kick".into());
                live.disconnect_all();
            }
        }
        let command = self.commands.pop_front().unwrap_or_else(|| "save".into());
        self.events.push(format!("command:{command}"));
        CommandReply {
            command,
            count: 1,
            ..CommandReply::default()
        }
    }

    fn display_menu(&mut self, params: &MenuParams) -> MenuReply {
        self.events.push(format!("menu:{}", params.title));
        MenuReply::default()
    }

    fn display_objects(&mut self, _: &ObjectsParams) -> ObjectsReply {
        ObjectsReply::default()
    }

    fn yn(&mut self, query: &str, _choices: &str, default: char) -> char {
        self.events.push(format!("yn:{query}"));
        self.answers.pop_front().unwrap_or(default)
    }

    fn getline(&mut self, _: &str) -> String {
        String::new()
    }

    fn getpos(&mut self, params: &GetposParams, queries: &mut dyn PromptQueries) -> GetposReply {
        if let Some(pos) = queries.describe_pos(params.x, params.y) {
            self.events.push(format!("look:{}", pos.bgdesc));
        }
        GetposReply {
            code: 0,
            x: params.x,
            y: params.y,
        }
    }

    fn getdir(&mut self, _: &str, _: bool) -> char {
        '.'
    }

    fn query_key(&mut self, _: &QueryKeyParams) -> QueryKeyReply {
        QueryKeyReply::default()
    }

    fn update_screen(&mut self, _: &DisplayFrame, ux: i32, uy: i32) {
        self.events.push(format!("screen:{ux},{uy}"));
    }

    fn print_message(&mut self, _: i64, msg: &str) {
        self.events.push(format!("msg:{msg}"));
    }

    fn update_status(&mut self, status: &PlayerStatus) {
        self.events.push(format!("status:{}", status.moves));
    }

    fn raw_print(&mut self, message: &str) {
        self.events.push(format!("raw:{message}"));
    }

    fn delay_output(&mut self) {
        self.events.push("delay".into());
    }
}

/// Connect and log in as `username`.
pub fn login(
    addr: SocketAddr,
    username: &str,
    password: &str,
    player: ScriptedPlayer,
) -> (Connection<ScriptedPlayer>, AuthResult) {
    let mut conn = Connection::new(client_config(addr), player);
    let result = conn.connect(username, password).unwrap();
    (conn, result)
}
