// Client callback table: server-issued callbacks -> `ClientUi` methods.
//
// While a call is in flight the server may send callbacks instead of the
// reply. Each callback name maps to one `CallbackEntry`:
// - **Interactive** (`yn`, `display_menu`, ...): the UI is asked, and the
//   answer goes back to the server under the same tag.
// - **Display** (`update_screen`, `print_message`, ...): applied, no reply.
//   These usually arrive batched in a message's `display` list.
// - **Notice** (`server_cancel`): unsolicited, may arrive at any receive.
//
// Malformed parameters for a known callback are logged and answered with
// the reply type's default (or skipped, for display callbacks). Unknown
// callback names are fatal; the correlator tears the connection down.
//
// `update_screen` is the one handler that touches protocol state: it
// applies the delta to the connection's stored `DisplayFrame` before
// handing the frame to the UI. `getpos` is the one prompt that may talk to
// the server before answering: the UI gets a `PromptQueries` handle for
// `describe_pos` lookups, which the server answers out of band.
//
// See also: `correlator.rs` (the caller), `delver_server::dispatch` (the
// mirror table on the server).

use delver_protocol::delta;
use delver_protocol::message::{decode_payload, tag};
use delver_protocol::payload::{
    CodeReply, CommandReply, DescribePosReply, GetdirParams, GetlineParams, GetlineReply,
    GetposParams, GetposReply, LevelChangedParams, LoadProgressParams, MenuParams, MenuReply,
    ObjectsParams, ObjectsReply, PlayerStatus, PrintMessageParams, QueryKeyParams, QueryKeyReply,
    RawPrintParams, RequestCommandParams, UpdateScreenParams, YnParams, YnReply,
};
use delver_protocol::{DisplayFrame, ProtocolError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// The presentation layer the remote client drives.
///
/// Interactive methods block until the player answers. Display methods
/// must not block.
pub trait ClientUi {
    fn request_command(&mut self, params: &RequestCommandParams) -> CommandReply;
    fn display_menu(&mut self, params: &MenuParams) -> MenuReply;
    fn display_objects(&mut self, params: &ObjectsParams) -> ObjectsReply;
    /// Ask a yes/no style question. `choices` lists the allowed answers.
    fn yn(&mut self, query: &str, choices: &str, default: char) -> char;
    fn getline(&mut self, query: &str) -> String;
    /// Pick a map position. `queries` may be used to describe positions
    /// while the player moves the cursor.
    fn getpos(&mut self, params: &GetposParams, queries: &mut dyn PromptQueries) -> GetposReply;
    /// Returns the direction key pressed, or ESC to cancel.
    fn getdir(&mut self, query: &str, restricted: bool) -> char;
    fn query_key(&mut self, params: &QueryKeyParams) -> QueryKeyReply;

    /// The map changed; `frame` already holds the new contents.
    fn update_screen(&mut self, frame: &DisplayFrame, ux: i32, uy: i32);
    fn print_message(&mut self, turn: i64, msg: &str);
    fn update_status(&mut self, status: &PlayerStatus);
    fn raw_print(&mut self, message: &str);

    fn load_progress(&mut self, _progress: i32) {}
    fn level_changed(&mut self, _display_mode: i32) {}
    fn delay_output(&mut self) {}
    /// The server abandoned the prompt currently on screen.
    fn server_cancel(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    Interactive,
    Display,
    Notice,
}

/// Interactive handlers return `Some(reply)`; the others return `None`.
pub type CallbackFn =
    fn(&mut dyn ClientUi, &mut Scope<'_>, &Value) -> Result<Option<Value>, ProtocolError>;

/// Requests a UI may make of the server while it is answering a prompt.
/// The server services these out of band; the prompt stays open.
pub trait PromptQueries {
    /// `None` if the link failed; the pending call then recovers as usual.
    fn describe_pos(&mut self, x: i32, y: i32) -> Option<DescribePosReply>;
}

/// Stands in when no link is available (display lists, tests).
pub struct NoQueries;

impl PromptQueries for NoQueries {
    fn describe_pos(&mut self, _x: i32, _y: i32) -> Option<DescribePosReply> {
        None
    }
}

/// Connection state a callback handler may touch besides the UI.
pub struct Scope<'a> {
    pub display: &'a mut DisplayFrame,
    pub queries: &'a mut dyn PromptQueries,
}

pub struct CallbackEntry {
    pub name: &'static str,
    pub kind: CallbackKind,
    pub handler: CallbackFn,
}

pub static CALLBACKS: &[CallbackEntry] = &[
    CallbackEntry {
        name: tag::REQUEST_COMMAND,
        kind: CallbackKind::Interactive,
        handler: on_request_command,
    },
    CallbackEntry {
        name: tag::DISPLAY_MENU,
        kind: CallbackKind::Interactive,
        handler: on_display_menu,
    },
    CallbackEntry {
        name: tag::DISPLAY_OBJECTS,
        kind: CallbackKind::Interactive,
        handler: on_display_objects,
    },
    CallbackEntry {
        name: tag::YN,
        kind: CallbackKind::Interactive,
        handler: on_yn,
    },
    CallbackEntry {
        name: tag::GETLINE,
        kind: CallbackKind::Interactive,
        handler: on_getline,
    },
    CallbackEntry {
        name: tag::GETPOS,
        kind: CallbackKind::Interactive,
        handler: on_getpos,
    },
    CallbackEntry {
        name: tag::GETDIR,
        kind: CallbackKind::Interactive,
        handler: on_getdir,
    },
    CallbackEntry {
        name: tag::QUERY_KEY,
        kind: CallbackKind::Interactive,
        handler: on_query_key,
    },
    CallbackEntry {
        name: tag::UPDATE_SCREEN,
        kind: CallbackKind::Display,
        handler: on_update_screen,
    },
    CallbackEntry {
        name: tag::PRINT_MESSAGE,
        kind: CallbackKind::Display,
        handler: on_print_message,
    },
    CallbackEntry {
        name: tag::UPDATE_STATUS,
        kind: CallbackKind::Display,
        handler: on_update_status,
    },
    CallbackEntry {
        name: tag::RAW_PRINT,
        kind: CallbackKind::Display,
        handler: on_raw_print,
    },
    CallbackEntry {
        name: tag::LOAD_PROGRESS,
        kind: CallbackKind::Display,
        handler: on_load_progress,
    },
    CallbackEntry {
        name: tag::LEVEL_CHANGED,
        kind: CallbackKind::Display,
        handler: on_level_changed,
    },
    CallbackEntry {
        name: tag::DELAY_OUTPUT,
        kind: CallbackKind::Display,
        handler: on_delay_output,
    },
    CallbackEntry {
        name: tag::SERVER_CANCEL,
        kind: CallbackKind::Notice,
        handler: on_server_cancel,
    },
];

pub fn lookup(name: &str) -> Option<&'static CallbackEntry> {
    CALLBACKS.iter().find(|entry| entry.name == name)
}

type HandlerResult = Result<Option<Value>, ProtocolError>;

/// Decode callback parameters, logging (not failing) on a bad payload.
fn params<T: DeserializeOwned>(name: &str, payload: &Value) -> Option<T> {
    match decode_payload(name, payload) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!(tag = %name, error = %e, "malformed callback parameters");
            None
        }
    }
}

fn reply<T: Serialize>(reply: &T) -> HandlerResult {
    Ok(Some(serde_json::to_value(reply)?))
}

fn first_char(s: &str) -> char {
    s.chars().next().unwrap_or('\0')
}

fn on_request_command(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params(tag::REQUEST_COMMAND, payload) {
        Some(p) => reply(&ui.request_command(&p)),
        None => reply(&CommandReply::default()),
    }
}

fn on_display_menu(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params(tag::DISPLAY_MENU, payload) {
        Some(p) => reply(&ui.display_menu(&p)),
        None => reply(&MenuReply::default()),
    }
}

fn on_display_objects(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params(tag::DISPLAY_OBJECTS, payload) {
        Some(p) => reply(&ui.display_objects(&p)),
        None => reply(&ObjectsReply::default()),
    }
}

fn on_yn(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params::<YnParams>(tag::YN, payload) {
        Some(p) => {
            let answer = ui.yn(&p.query, &p.set, first_char(&p.def));
            reply(&YnReply {
                code: answer as i32,
            })
        }
        None => reply(&YnReply::default()),
    }
}

fn on_getline(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params::<GetlineParams>(tag::GETLINE, payload) {
        Some(p) => reply(&GetlineReply {
            line: ui.getline(&p.query),
        }),
        None => reply(&GetlineReply::default()),
    }
}

fn on_getpos(ui: &mut dyn ClientUi, scope: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params(tag::GETPOS, payload) {
        Some(p) => reply(&ui.getpos(&p, &mut *scope.queries)),
        None => reply(&GetposReply::default()),
    }
}

fn on_getdir(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params::<GetdirParams>(tag::GETDIR, payload) {
        Some(p) => {
            let key = ui.getdir(&p.query, p.restricted);
            reply(&CodeReply { code: key as i32 })
        }
        None => reply(&CodeReply::default()),
    }
}

fn on_query_key(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    match params(tag::QUERY_KEY, payload) {
        Some(p) => reply(&ui.query_key(&p)),
        None => reply(&QueryKeyReply::default()),
    }
}

fn on_update_screen(
    ui: &mut dyn ClientUi,
    scope: &mut Scope<'_>,
    payload: &Value,
) -> HandlerResult {
    if let Some(p) = params::<UpdateScreenParams>(tag::UPDATE_SCREEN, payload) {
        // A bad delta leaves the frame untouched but stale; the caller resyncs.
        delta::apply_value(scope.display, &p.dbuf)?;
        ui.update_screen(scope.display, p.ux, p.uy);
    }
    Ok(None)
}

fn on_print_message(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    if let Some(p) = params::<PrintMessageParams>(tag::PRINT_MESSAGE, payload) {
        ui.print_message(p.turn, &p.msg);
    }
    Ok(None)
}

fn on_update_status(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    if let Some(status) = params::<PlayerStatus>(tag::UPDATE_STATUS, payload) {
        ui.update_status(&status);
    }
    Ok(None)
}

fn on_raw_print(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    if let Some(p) = params::<RawPrintParams>(tag::RAW_PRINT, payload) {
        ui.raw_print(&p.message);
    }
    Ok(None)
}

fn on_load_progress(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    if let Some(p) = params::<LoadProgressParams>(tag::LOAD_PROGRESS, payload) {
        ui.load_progress(p.progress);
    }
    Ok(None)
}

fn on_level_changed(ui: &mut dyn ClientUi, _: &mut Scope<'_>, payload: &Value) -> HandlerResult {
    if let Some(p) = params::<LevelChangedParams>(tag::LEVEL_CHANGED, payload) {
        ui.level_changed(p.display_mode);
    }
    Ok(None)
}

fn on_delay_output(ui: &mut dyn ClientUi, _: &mut Scope<'_>, _: &Value) -> HandlerResult {
    ui.delay_output();
    Ok(None)
}

fn on_server_cancel(ui: &mut dyn ClientUi, _: &mut Scope<'_>, _: &Value) -> HandlerResult {
    ui.server_cancel();
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Answers every prompt with a fixed value and records display calls.
    #[derive(Default)]
    struct StubUi {
        messages: Vec<String>,
        screens: u32,
        cancelled: bool,
    }

    impl ClientUi for StubUi {
        fn request_command(&mut self, _: &RequestCommandParams) -> CommandReply {
            CommandReply {
                command: "wait".into(),
                count: 1,
                ..CommandReply::default()
            }
        }
        fn display_menu(&mut self, _: &MenuParams) -> MenuReply {
            MenuReply::default()
        }
        fn display_objects(&mut self, _: &ObjectsParams) -> ObjectsReply {
            ObjectsReply::default()
        }
        fn yn(&mut self, _: &str, _: &str, default: char) -> char {
            default
        }
        fn getline(&mut self, query: &str) -> String {
            format!("re: {query}")
        }
        fn getpos(
            &mut self,
            params: &GetposParams,
            queries: &mut dyn PromptQueries,
        ) -> GetposReply {
            if let Some(pos) = queries.describe_pos(params.x, params.y) {
                self.messages.push(pos.bgdesc);
            }
            GetposReply {
                code: 0,
                x: params.x + 1,
                y: params.y,
            }
        }
        fn getdir(&mut self, _: &str, _: bool) -> char {
            'h'
        }
        fn query_key(&mut self, _: &QueryKeyParams) -> QueryKeyReply {
            QueryKeyReply {
                code: 'a' as i32,
                count: -1,
            }
        }
        fn update_screen(&mut self, _: &DisplayFrame, _: i32, _: i32) {
            self.screens += 1;
        }
        fn print_message(&mut self, _: i64, msg: &str) {
            self.messages.push(msg.into());
        }
        fn update_status(&mut self, _: &PlayerStatus) {}
        fn raw_print(&mut self, message: &str) {
            self.messages.push(message.into());
        }
        fn server_cancel(&mut self) {
            self.cancelled = true;
        }
    }

    /// Describes every position as floor and counts the lookups.
    #[derive(Default)]
    struct Floor {
        lookups: u32,
    }

    impl PromptQueries for Floor {
        fn describe_pos(&mut self, x: i32, y: i32) -> Option<DescribePosReply> {
            self.lookups += 1;
            Some(DescribePosReply {
                bgdesc: format!("floor at {x},{y}"),
                ..DescribePosReply::default()
            })
        }
    }

    fn run(name: &str, ui: &mut StubUi, frame: &mut DisplayFrame, payload: Value) -> HandlerResult {
        let entry = lookup(name).unwrap();
        let mut scope = Scope {
            display: frame,
            queries: &mut NoQueries,
        };
        (entry.handler)(ui, &mut scope, &payload)
    }

    #[test]
    fn every_callback_tag_is_in_the_table_once() {
        for name in [
            tag::REQUEST_COMMAND,
            tag::DISPLAY_MENU,
            tag::DISPLAY_OBJECTS,
            tag::YN,
            tag::GETLINE,
            tag::GETPOS,
            tag::GETDIR,
            tag::QUERY_KEY,
            tag::UPDATE_SCREEN,
            tag::PRINT_MESSAGE,
            tag::UPDATE_STATUS,
            tag::RAW_PRINT,
            tag::LOAD_PROGRESS,
            tag::LEVEL_CHANGED,
            tag::DELAY_OUTPUT,
            tag::SERVER_CANCEL,
        ] {
            assert_eq!(CALLBACKS.iter().filter(|e| e.name == name).count(), 1, "{name}");
        }
        assert!(lookup(tag::AUTH).is_none());
    }

    #[test]
    fn yn_answers_with_the_character_code() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let out = run(
            tag::YN,
            &mut ui,
            &mut frame,
            json!({"query": "Die?", "set": "yn", "def": "n"}),
        )
        .unwrap();
        assert_eq!(out, Some(json!({"return": 110})));
    }

    #[test]
    fn getpos_may_describe_positions_before_answering() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let mut floor = Floor::default();
        let mut scope = Scope {
            display: &mut frame,
            queries: &mut floor,
        };
        let payload = json!({"x": 4, "y": 9, "force": false, "goal": "a spot"});
        let out = (lookup(tag::GETPOS).unwrap().handler)(&mut ui, &mut scope, &payload).unwrap();
        assert_eq!(out, Some(json!({"return": 0, "x": 5, "y": 9})));
        assert_eq!(floor.lookups, 1);
        assert_eq!(ui.messages, ["floor at 4,9"]);

        // Without a link the prompt is still answered.
        let mut ui = StubUi::default();
        let out = run(tag::GETPOS, &mut ui, &mut frame, payload).unwrap();
        assert_eq!(out, Some(json!({"return": 0, "x": 5, "y": 9})));
        assert!(ui.messages.is_empty());
    }

    #[test]
    fn malformed_interactive_params_get_a_default_reply() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let out = run(tag::GETLINE, &mut ui, &mut frame, json!({"query": 17})).unwrap();
        assert_eq!(out, Some(json!({"line": ""})));
    }

    #[test]
    fn every_prompt_is_answered_whatever_the_payload() {
        for entry in CALLBACKS.iter().filter(|e| e.kind == CallbackKind::Interactive) {
            for payload in [json!({}), json!("garbage"), json!([1, 2])] {
                let mut ui = StubUi::default();
                let mut frame = DisplayFrame::new();
                let out = run(entry.name, &mut ui, &mut frame, payload).unwrap();
                assert!(out.is_some(), "{}", entry.name);
            }
        }
    }

    #[test]
    fn display_callbacks_produce_no_reply() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let out = run(
            tag::PRINT_MESSAGE,
            &mut ui,
            &mut frame,
            json!({"turn": 3, "msg": "You hear a door open."}),
        )
        .unwrap();
        assert_eq!(out, None);
        assert_eq!(ui.messages, ["You hear a door open."]);
    }

    #[test]
    fn update_screen_applies_delta_before_the_ui_sees_it() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let mut columns = vec![json!(0); delver_protocol::MAP_COLS];
        let mut rows = vec![json!(0); delver_protocol::MAP_ROWS];
        rows[2] = json!([0, 5, 0, 0, 0, 0, 0, 0, 0, 1]);
        columns[7] = json!(rows);

        run(
            tag::UPDATE_SCREEN,
            &mut ui,
            &mut frame,
            json!({"ux": 7, "uy": 2, "dbuf": columns}),
        )
        .unwrap();
        assert_eq!(ui.screens, 1);
        assert_eq!(frame.cell(7, 2).map(|c| c.bg), Some(5));
    }

    #[test]
    fn bad_delta_is_fatal_and_skips_the_ui() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let err = run(
            tag::UPDATE_SCREEN,
            &mut ui,
            &mut frame,
            json!({"ux": 0, "uy": 0, "dbuf": [1, 1]}),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ui.screens, 0);
    }

    #[test]
    fn server_cancel_reaches_the_ui() {
        let mut ui = StubUi::default();
        let mut frame = DisplayFrame::new();
        let entry = lookup(tag::SERVER_CANCEL).unwrap();
        assert_eq!(entry.kind, CallbackKind::Notice);
        run(tag::SERVER_CANCEL, &mut ui, &mut frame, json!({})).unwrap();
        assert!(ui.cancelled);
    }
}
