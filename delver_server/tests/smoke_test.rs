// Server session tests over real localhost TCP.
//
// Each test starts a server on port 0 with a small fixed backend and drives
// it with a bare `Transport`, writing the client side of the conversation by
// hand so exact wire shapes and error paths can be asserted.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use delver_protocol::payload::{
    DescribePosReply, DrawingInfoReply, GameInfo, OptionEntry, RolesReply, StartGameParams,
    StartGameReply,
};
use delver_protocol::{
    AuthResult, DisplayCell, DisplayFrame, FollowMode, GameId, Message, PlayResult, Transport,
    tag,
};
use delver_server::{Accounts, GameBackend, GameUi, ServerConfig, SessionAbort, start_server};
use serde_json::{Value, json};

struct Fixed;

impl Accounts for Fixed {
    fn authenticate(&self, username: &str, password: &str) -> AuthResult {
        match (username, password) {
            ("a", "p") | ("b", "p") => AuthResult::SuccessNew,
            ("a" | "b", _) => AuthResult::BadPassword,
            _ => AuthResult::UnknownUser,
        }
    }

    fn register(&self, _: &str, _: &str, _: Option<&str>) -> AuthResult {
        AuthResult::SuccessNew
    }
}

impl GameBackend for Fixed {
    fn start_game(&self, _: &str, _: &StartGameParams) -> StartGameReply {
        StartGameReply {
            code: 0,
            gameid: GameId(9),
        }
    }

    fn play_game(
        &self,
        _: &str,
        _: GameId,
        _: FollowMode,
        ui: &mut dyn GameUi,
    ) -> Result<PlayResult, SessionAbort> {
        let mut frame = DisplayFrame::new();
        frame.set(
            3,
            4,
            DisplayCell {
                bg: 5,
                visible: true,
                ..DisplayCell::EMPTY
            },
        );
        ui.update_screen(&frame, 1, 1);
        ui.update_screen(&frame, 1, 1);
        ui.update_screen(&frame, 2, 1);
        ui.print_message(1, "Welcome.");
        match ui.yn("Die?", "yn", 'n')? {
            'y' => Ok(PlayResult::GameOver),
            _ => Ok(PlayResult::Ok),
        }
    }

    fn list_games(&self, _: &str, _: bool, _: u32) -> Vec<GameInfo> {
        vec![GameInfo {
            gameid: GameId(9),
            plname: "a".into(),
            ..GameInfo::default()
        }]
    }

    fn options(&self, _: &str) -> Vec<OptionEntry> {
        Vec::new()
    }

    fn set_option(&self, _: &str, _: &str, _: &Value) -> i32 {
        0
    }

    fn roles(&self) -> RolesReply {
        RolesReply {
            roles: vec!["Valkyrie".into()],
            ..RolesReply::default()
        }
    }

    fn drawing_info(&self) -> DrawingInfoReply {
        DrawingInfoReply::default()
    }

    fn describe_pos(&self, _: &str, x: i32, y: i32) -> DescribePosReply {
        DescribePosReply {
            bgdesc: format!("floor at {x},{y}"),
            ..DescribePosReply::default()
        }
    }
}

fn server() -> (delver_server::ServerHandle, u16) {
    let config = ServerConfig {
        port: 0,
        handshake_timeout_ms: 5_000,
        idle_timeout_ms: 5_000,
        ..ServerConfig::default()
    };
    let (handle, addr) = start_server(config, Arc::new(Fixed), Arc::new(Fixed)).unwrap();
    (handle, addr.port())
}

fn client(port: u16) -> Transport {
    Transport::connect(
        "127.0.0.1",
        port,
        Duration::from_secs(2),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn send(transport: &mut Transport, value: Value) {
    transport
        .send(&Message::from_value(value).unwrap())
        .unwrap();
}

fn recv(transport: &mut Transport) -> Value {
    transport.receive().unwrap().to_value()
}

fn login(transport: &mut Transport, user: &str) -> Value {
    send(transport, json!({"auth": {"username": user, "password": "p"}}));
    recv(transport)
}

/// After a fatal error the server reports it and closes the socket.
fn assert_fatal(transport: &mut Transport) {
    let notice = recv(transport);
    assert_eq!(notice["server_error"]["error"], json!(true), "{notice}");
    assert!(transport.receive().is_err());
}

#[test]
fn auth_reports_version_and_reconnects() {
    let (handle, port) = server();
    let mut first = client(port);
    let reply = login(&mut first, "a");
    assert_eq!(reply["auth"]["return"], json!(AuthResult::SuccessNew.code()));
    assert_eq!(reply["auth"]["version"]["minor"], json!(1));

    // The first session is still live, so this is a resumption that
    // replaces it.
    let mut second = client(port);
    let reply = login(&mut second, "a");
    assert_eq!(reply["auth"]["return"], json!(AuthResult::SuccessReconnect.code()));

    let mut third = client(port);
    send(&mut third, json!({"auth": {"username": "a", "password": "x"}}));
    assert_eq!(recv(&mut third), json!({"auth": {"return": 1}}));
    handle.stop();
}

#[test]
fn relogin_closes_the_superseded_session() {
    let (handle, port) = server();
    let mut first = client(port);
    login(&mut first, "a");
    send(&mut first, json!({"play_game": {"gameid": 9, "followmode": 0}}));
    assert_eq!(first.receive().unwrap().tag, tag::YN);
    // The first client never answers.

    let mut second = client(port);
    let reply = login(&mut second, "a");
    assert_eq!(reply["auth"]["return"], json!(AuthResult::SuccessReconnect.code()));
    assert!(first.receive().is_err());

    let live = handle.connections();
    let deadline = Instant::now() + Duration::from_secs(5);
    while live.count() > 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(live.count(), 1);

    send(&mut second, json!({"play_game": {"gameid": 9, "followmode": 0}}));
    assert_eq!(second.receive().unwrap().tag, tag::YN);
    send(&mut second, json!({"yn": {"return": u32::from('n')}}));
    assert_eq!(recv(&mut second), json!({"play_game": {"return": 0}}));
    handle.stop();
}

#[test]
fn commands_without_login() {
    let (handle, port) = server();
    let mut transport = client(port);
    send(&mut transport, json!({"get_roles": {}}));
    assert_eq!(recv(&mut transport)["get_roles"]["roles"], json!(["Valkyrie"]));

    send(&mut transport, json!({"list_games": {"completed": false, "limit": 5}}));
    assert_fatal(&mut transport);
    handle.stop();
}

#[test]
fn unknown_command_is_fatal() {
    let (handle, port) = server();
    let mut transport = client(port);
    send(&mut transport, json!({"exit_game": {}}));
    assert_fatal(&mut transport);
    handle.stop();
}

#[test]
fn malformed_params_get_an_empty_result() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "a");
    send(&mut transport, json!({"list_games": {"completed": "yes"}}));
    assert_eq!(recv(&mut transport), json!({"list_games": {}}));

    send(&mut transport, json!({"list_games": {"completed": true, "limit": 1}}));
    assert_eq!(recv(&mut transport)["list_games"]["games"][0]["gameid"], json!(9));
    handle.stop();
}

#[test]
fn play_game_with_nested_prompt_and_display_queue() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "a");
    send(&mut transport, json!({"play_game": {"gameid": 9, "followmode": 0}}));

    let prompt = transport.receive().unwrap();
    assert_eq!(prompt.tag, tag::YN);
    assert_eq!(prompt.payload, json!({"query": "Die?", "set": "yn", "def": "n"}));
    let display: Vec<_> = prompt
        .notifications
        .iter()
        .map(|note| note.tag.as_str())
        .collect();
    // The repeated identical frame is suppressed; the cursor move is not.
    assert_eq!(display, [tag::UPDATE_SCREEN, tag::UPDATE_SCREEN, tag::PRINT_MESSAGE]);
    let first = &prompt.notifications[0].payload;
    assert_eq!(first["dbuf"].as_array().map(Vec::len), Some(80));
    assert_eq!(first["dbuf"][0], json!(0));
    assert_eq!(
        prompt.notifications[1].payload,
        json!({"ux": 2, "uy": 1, "dbuf": 1})
    );

    // Out-of-band query while the prompt is outstanding.
    send(&mut transport, json!({"describe_pos": {"x": 3, "y": 4}}));
    let described = recv(&mut transport);
    assert_eq!(described["describe_pos"]["bgdesc"], json!("floor at 3,4"));

    let yes = u32::from('y');
    send(&mut transport, json!({"yn": {"return": yes}}));
    assert_eq!(recv(&mut transport), json!({"play_game": {"return": 1}}));
    handle.stop();
}

#[test]
fn malformed_callback_answer_uses_the_default() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "a");
    send(&mut transport, json!({"play_game": {"gameid": 9, "followmode": 0}}));
    recv(&mut transport);
    send(&mut transport, json!({"yn": {"return": "y"}}));
    assert_eq!(recv(&mut transport), json!({"play_game": {"return": 0}}));
    handle.stop();
}

#[test]
fn command_out_of_sequence_is_fatal() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "a");
    send(&mut transport, json!({"play_game": {"gameid": 9, "followmode": 0}}));
    recv(&mut transport);
    send(&mut transport, json!({"list_games": {"completed": false, "limit": 1}}));
    assert_fatal(&mut transport);
    handle.stop();
}

#[test]
fn shutdown_during_prompt_closes_the_session() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "a");
    send(&mut transport, json!({"play_game": {"gameid": 9, "followmode": 0}}));
    recv(&mut transport);
    send(&mut transport, json!({"shutdown": {}}));
    assert!(transport.receive().is_err());

    // A clean shutdown forgets the user, so the next login is fresh.
    let mut again = client(port);
    let reply = login(&mut again, "a");
    assert_eq!(reply["auth"]["return"], json!(AuthResult::SuccessNew.code()));
    handle.stop();
}

#[test]
fn unparseable_messages_are_retried_then_fatal() {
    let (handle, port) = server();
    let mut transport = client(port);
    for _ in 0..3 {
        transport.send_raw(b"{not json").unwrap();
        let notice = recv(&mut transport);
        assert_eq!(notice["server_error"]["error"], json!(false), "{notice}");
    }
    transport.send_raw(b"[]").unwrap();
    assert_fatal(&mut transport);
    handle.stop();
}

#[test]
fn stop_drops_open_connections() {
    let (handle, port) = server();
    let mut transport = client(port);
    login(&mut transport, "b");
    assert_eq!(handle.connections().count(), 1);
    handle.stop();
    assert!(transport.receive().is_err());
}
