// Core value types for the remote-play protocol.
//
// Small newtypes and result-code enums shared by the client and server. The
// wire carries result codes as plain integers under the `return` key; the
// enums here give them names and are converted at the typed-API boundary
// (`from_code`/`code`). Unknown codes decode to `None`, and callers decide
// how to treat them.

use serde::{Deserialize, Serialize};

/// Server-assigned game identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub i64);

/// Version the server reports on successful authentication.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patchlevel: u32,
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patchlevel)
    }
}

/// Outcome of `auth` / `register`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthResult {
    UnknownUser,
    BadPassword,
    /// Authenticated, new server session.
    SuccessNew,
    /// Authenticated, reattached to a session that dropped recently.
    SuccessReconnect,
    /// Client-side only: the server could not be reached.
    NoConnection,
}

impl AuthResult {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::UnknownUser,
            1 => Self::BadPassword,
            2 => Self::SuccessNew,
            3 => Self::SuccessReconnect,
            4 => Self::NoConnection,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::UnknownUser => 0,
            Self::BadPassword => 1,
            Self::SuccessNew => 2,
            Self::SuccessReconnect => 3,
            Self::NoConnection => 4,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::SuccessNew | Self::SuccessReconnect)
    }
}

/// Outcome of `play_game`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayResult {
    /// The game was saved or paused and can be resumed.
    Ok,
    GameOver,
    NotFound,
    InUse,
    LoadFailed,
    /// Client-side only: the connection was lost for good.
    NetworkError,
}

impl PlayResult {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::GameOver,
            2 => Self::NotFound,
            3 => Self::InUse,
            4 => Self::LoadFailed,
            5 => Self::NetworkError,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::GameOver => 1,
            Self::NotFound => 2,
            Self::InUse => 3,
            Self::LoadFailed => 4,
            Self::NetworkError => 5,
        }
    }
}

/// How a client attaches to a game in `play_game`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FollowMode {
    #[default]
    Play,
    Watch,
    Replay,
}

impl FollowMode {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Play,
            1 => Self::Watch,
            2 => Self::Replay,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Play => 0,
            Self::Watch => 1,
            Self::Replay => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_match_wire_values() {
        assert_eq!(AuthResult::from_code(3), Some(AuthResult::SuccessReconnect));
        assert_eq!(AuthResult::NoConnection.code(), 4);
        assert_eq!(AuthResult::from_code(9), None);
        assert!(AuthResult::SuccessNew.is_success());
        assert!(!AuthResult::BadPassword.is_success());
    }

    #[test]
    fn play_codes_match_wire_values() {
        for code in 0..=5 {
            assert_eq!(PlayResult::from_code(code).map(PlayResult::code), Some(code));
        }
        assert_eq!(PlayResult::from_code(-1), None);
    }

    #[test]
    fn game_id_is_a_bare_integer_on_the_wire() {
        assert_eq!(serde_json::to_string(&GameId(5)).unwrap(), "5");
    }
}
