// Typed parameter and result objects for every wire message.
//
// One struct per message shape, named after the command it belongs to
// (`*Params` for the side that initiates, `*Reply` for the answer). Field
// names are the stable wire identifiers; integer result codes live under the
// JSON key `return`, exposed here as `code`.
//
// All reply types and most parameter types carry `#[serde(default)]`: a
// peer that receives malformed parameters answers with an empty object, and
// that empty object must decode into the reply type's defaults rather than
// failing a second time.
//
// See also: `message.rs` for the envelope and tag constants, `types.rs` for
// the result-code enums these integers convert into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{GameId, ServerVersion};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParams {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of `auth` and `register`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthReply {
    #[serde(rename = "return")]
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ServerVersion>,
}

/// Empty parameter/result object, `{}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Generic `{return}` result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeReply {
    #[serde(rename = "return")]
    pub code: i32,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Character choices for a new game. Indices refer to the lists returned by
/// `get_roles`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartGameParams {
    pub name: String,
    pub role: i32,
    pub race: i32,
    pub gend: i32,
    pub align: i32,
    pub mode: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartGameReply {
    #[serde(rename = "return")]
    pub code: i32,
    pub gameid: GameId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayGameParams {
    pub gameid: GameId,
    pub followmode: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListGamesParams {
    pub completed: bool,
    pub limit: u32,
}

/// One row of `list_games`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameInfo {
    pub gameid: GameId,
    pub status: i32,
    pub plname: String,
    pub plrole: String,
    pub plrace: String,
    pub plgend: String,
    pub plalign: String,
    pub moves: i64,
    pub depth: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListGamesReply {
    pub games: Vec<GameInfo>,
}

// ---------------------------------------------------------------------------
// Options and static game info
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionEntry {
    pub name: String,
    pub helptxt: String,
    #[serde(rename = "type")]
    pub kind: i32,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetOptionsReply {
    pub options: Vec<OptionEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptionParams {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesReply {
    pub roles: Vec<String>,
    pub races: Vec<String>,
    pub genders: Vec<String>,
    pub aligns: Vec<String>,
}

/// One glyph-table entry of `get_drawing_info`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolInfo {
    pub name: String,
    pub ch: u32,
    pub color: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingInfoReply {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribePosParams {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribePosReply {
    pub bgdesc: String,
    pub trapdesc: String,
    pub objdesc: String,
    pub mondesc: String,
    pub objcount: i32,
}

// ---------------------------------------------------------------------------
// Interactive callbacks (server -> client -> server)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCommandParams {
    pub debug: bool,
    pub completed: bool,
    pub interrupted: bool,
}

/// Argument attached to a command, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandArg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<(i32, i32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invlet: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub str: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandReply {
    pub command: String,
    pub count: i32,
    pub arg: CommandArg,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuItem {
    pub caption: String,
    pub accel: Option<char>,
    pub group_accel: Option<char>,
    pub id: i32,
    pub role: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuParams {
    pub items: Vec<MenuItem>,
    pub how: i32,
    pub title: String,
    pub plhint: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuReply {
    pub results: Vec<i32>,
    pub howclosed: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectItem {
    pub caption: String,
    pub accel: Option<char>,
    pub group_accel: Option<char>,
    pub id: i32,
    pub role: i32,
    pub count: i32,
    pub worn: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsParams {
    pub items: Vec<ObjectItem>,
    pub how: i32,
    pub title: String,
    pub plhint: i32,
}

/// One selection in `display_objects`; `count` of -1 means "all".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPick {
    pub id: i32,
    pub count: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsReply {
    pub results: Vec<ObjectPick>,
    pub howclosed: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YnParams {
    pub query: String,
    /// Allowed answers, one character each.
    pub set: String,
    pub def: String,
}

/// Character answers travel as their code point (`'n'` is 110).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YnReply {
    #[serde(rename = "return")]
    pub code: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetlineParams {
    pub query: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetlineReply {
    pub line: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetposParams {
    pub x: i32,
    pub y: i32,
    pub force: bool,
    pub goal: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetposReply {
    #[serde(rename = "return")]
    pub code: i32,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetdirParams {
    pub query: String,
    pub restricted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryKeyParams {
    pub query: String,
    pub allow_count: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryKeyReply {
    #[serde(rename = "return")]
    pub code: i32,
    pub count: i32,
}

// ---------------------------------------------------------------------------
// Display-only callbacks and notices
// ---------------------------------------------------------------------------

/// `update_screen`. `dbuf` is the encoded `DisplayDelta`, kept raw here so
/// that decoding errors surface as `BadDelta` from `delta.rs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateScreenParams {
    pub ux: i32,
    pub uy: i32,
    pub dbuf: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintMessageParams {
    pub turn: i64,
    pub msg: String,
}

/// Bottom-line status fields sent with `update_status`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStatus {
    pub plname: String,
    pub rank: String,
    pub level_desc: String,
    pub hp: i32,
    pub hpmax: i32,
    pub en: i32,
    pub enmax: i32,
    pub ac: i32,
    pub gold: i64,
    pub level: i32,
    pub xp: i64,
    pub moves: i64,
    pub conditions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPrintParams {
    pub message: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadProgressParams {
    pub progress: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelChangedParams {
    pub display_mode: i32,
}

/// `server_error`: `error == false` means the peer could not parse our last
/// message and a verbatim resend is safe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerErrorParams {
    pub error: bool,
    pub message: String,
}
