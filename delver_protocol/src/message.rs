// The message envelope.
//
// Every wire message is a JSON object with exactly one command key mapping to
// that command's payload, optionally accompanied by a sibling `display` key
// holding an ordered array of notification objects (each itself a single-key
// object). Notifications are display-only callbacks that ride along on the
// next outgoing message so the server does not need a round trip per screen
// update:
//
//     {"yn": {"query": "Die?", "set": "yn", "def": "n"},
//      "display": [{"print_message": {"turn": 12, "msg": "You feel weak."}}]}
//
// Payloads are kept as `serde_json::Value` in the envelope; `payload.rs`
// holds the typed parameter/result structs, decoded on demand with
// `Message::payload_as`. Decoding failures of a known command's payload are
// reported as the non-fatal `ProtocolError::BadPayload`.
//
// See also: `framing.rs` (bytes on the wire), `transport.rs` (sockets).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Reserved sibling key carrying the notification list.
pub const DISPLAY_KEY: &str = "display";

/// Message tags used on the wire, both directions.
pub mod tag {
    // Client -> server commands.
    pub const AUTH: &str = "auth";
    pub const REGISTER: &str = "register";
    pub const START_GAME: &str = "start_game";
    pub const PLAY_GAME: &str = "play_game";
    pub const LIST_GAMES: &str = "list_games";
    pub const GET_OPTIONS: &str = "get_options";
    pub const SET_OPTION: &str = "set_option";
    pub const GET_ROLES: &str = "get_roles";
    pub const GET_DRAWING_INFO: &str = "get_drawing_info";
    pub const DESCRIBE_POS: &str = "describe_pos";
    pub const SHUTDOWN: &str = "shutdown";

    // Server -> client interactive callbacks.
    pub const REQUEST_COMMAND: &str = "request_command";
    pub const DISPLAY_MENU: &str = "display_menu";
    pub const DISPLAY_OBJECTS: &str = "display_objects";
    pub const YN: &str = "yn";
    pub const GETLINE: &str = "getline";
    pub const GETPOS: &str = "getpos";
    pub const GETDIR: &str = "getdir";
    pub const QUERY_KEY: &str = "query_key";

    // Server -> client display-only callbacks.
    pub const UPDATE_SCREEN: &str = "update_screen";
    pub const PRINT_MESSAGE: &str = "print_message";
    pub const UPDATE_STATUS: &str = "update_status";
    pub const RAW_PRINT: &str = "raw_print";
    pub const LOAD_PROGRESS: &str = "load_progress";
    pub const LEVEL_CHANGED: &str = "level_changed";
    pub const DELAY_OUTPUT: &str = "delay_output";

    // Unsolicited notices.
    pub const SERVER_CANCEL: &str = "server_cancel";
    pub const SERVER_ERROR: &str = "server_error";
}

/// A display-only sub-message carried in the `display` list.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub tag: String,
    pub payload: Value,
}

impl Notification {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Build a notification from a typed payload.
    pub fn typed<T: Serialize>(tag: impl Into<String>, payload: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(tag, serde_json::to_value(payload)?))
    }

    fn to_value(&self) -> Value {
        let mut obj = Map::with_capacity(1);
        obj.insert(self.tag.clone(), self.payload.clone());
        Value::Object(obj)
    }
}

/// One complete wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub tag: String,
    pub payload: Value,
    pub notifications: Vec<Notification>,
}

impl Message {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
            notifications: Vec::new(),
        }
    }

    /// Build a message from a typed payload.
    pub fn typed<T: Serialize>(tag: impl Into<String>, payload: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(tag, serde_json::to_value(payload)?))
    }

    /// An empty-object payload, `{tag: {}}`.
    pub fn empty(tag: impl Into<String>) -> Self {
        Self::new(tag, Value::Object(Map::new()))
    }

    pub fn with_notifications(mut self, notifications: Vec<Notification>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Decode the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_payload(&self.tag, &self.payload)
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::with_capacity(2);
        obj.insert(self.tag.clone(), self.payload.clone());
        if !self.notifications.is_empty() {
            let list = self.notifications.iter().map(Notification::to_value).collect();
            obj.insert(DISPLAY_KEY.into(), Value::Array(list));
        }
        Value::Object(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    /// Parse one framed JSON payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Validate the envelope shape: exactly one command key plus an optional
    /// `display` array of single-key objects.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(obj) = value else {
            return Err(ProtocolError::Malformed("message is not an object".into()));
        };

        let mut command = None;
        let mut notifications = Vec::new();
        for (key, payload) in obj {
            if key == DISPLAY_KEY {
                notifications = parse_notifications(payload)?;
            } else if command.is_some() {
                return Err(ProtocolError::Malformed(format!(
                    "more than one command key (`{key}`)"
                )));
            } else {
                command = Some((key, payload));
            }
        }

        let (tag, payload) =
            command.ok_or_else(|| ProtocolError::Malformed("message has no command key".into()))?;
        Ok(Self {
            tag,
            payload,
            notifications,
        })
    }
}

/// Decode a payload value for the given tag, mapping serde failures to the
/// low-severity `BadPayload`.
pub fn decode_payload<T: DeserializeOwned>(tag: &str, payload: &Value) -> Result<T, ProtocolError> {
    T::deserialize(payload).map_err(|e| ProtocolError::BadPayload {
        tag: tag.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_notifications(value: Value) -> Result<Vec<Notification>, ProtocolError> {
    let Value::Array(items) = value else {
        return Err(ProtocolError::Malformed(
            "`display` is not an array".into(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(obj) if obj.len() == 1 => {
                let (tag, payload) = obj.into_iter().next().ok_or_else(|| {
                    ProtocolError::Malformed("empty display notification".into())
                })?;
                Ok(Notification { tag, payload })
            }
            _ => Err(ProtocolError::Malformed(
                "display notification is not a single-key object".into(),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_command() {
        let msg = Message::from_slice(br#"{"auth":{"return":3}}"#).unwrap();
        assert_eq!(msg.tag, "auth");
        assert_eq!(msg.payload, json!({"return": 3}));
        assert!(msg.notifications.is_empty());
    }

    #[test]
    fn parses_sibling_notifications_in_order() {
        let msg = Message::from_value(json!({
            "display": [
                {"print_message": {"turn": 1, "msg": "a"}},
                {"delay_output": {}},
            ],
            "yn": {"query": "Die?", "set": "yn", "def": "n"},
        }))
        .unwrap();
        assert_eq!(msg.tag, "yn");
        let tags: Vec<_> = msg.notifications.iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, ["print_message", "delay_output"]);
    }

    #[test]
    fn serializes_display_only_when_present() {
        let bare = Message::empty(tag::GET_ROLES).to_value();
        assert_eq!(bare, json!({"get_roles": {}}));

        let with = Message::empty(tag::YN)
            .with_notifications(vec![Notification::new(tag::DELAY_OUTPUT, json!({}))])
            .to_value();
        assert_eq!(with, json!({"yn": {}, "display": [{"delay_output": {}}]}));
    }

    #[test]
    fn rejects_bad_envelopes() {
        for bad in [
            json!([1, 2]),
            json!({}),
            json!({"display": []}),
            json!({"auth": {}, "register": {}}),
            json!({"auth": {}, "display": {"x": 1}}),
            json!({"auth": {}, "display": [{"a": 1, "b": 2}]}),
        ] {
            let err = Message::from_value(bad.clone()).unwrap_err();
            assert!(
                matches!(err, ProtocolError::Malformed(_)),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn invalid_json_is_a_json_error() {
        let err = Message::from_slice(b"{\"auth\":").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn bad_payload_is_low_severity() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Needs {
            query: String,
        }
        let msg = Message::new(tag::YN, json!({"query": 5}));
        let err = msg.payload_as::<Needs>().unwrap_err();
        assert!(!err.is_fatal());
    }
}
