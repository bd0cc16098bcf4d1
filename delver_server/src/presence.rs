// Which users are connected, and which dropped recently.
//
// A login counts as a reconnect (`AuthResult::SuccessReconnect`) when the
// same user still has a live session (the old socket has not timed out yet)
// or lost one uncleanly within the grace period. A clean `shutdown` forgets
// the user once their last session ends.
//
// A user has at most one current session. Logging in again hands the older
// sessions back to the caller in `Login::superseded` and forgets them here;
// the caller closes their sockets, and their eventual `detach` is a no-op.
//
// Shared by all session threads behind a mutex; every critical section is a
// handful of map operations.

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Entry {
    sessions: Vec<u64>,
    last_drop: Option<Instant>,
}

/// Result of `Presence::attach`.
#[derive(Debug, PartialEq, Eq)]
pub struct Login {
    pub resumed: bool,
    /// Sessions of the same user that the new one replaces.
    pub superseded: Vec<u64>,
}

#[derive(Debug)]
pub struct Presence {
    grace: Duration,
    users: Mutex<HashMap<String, Entry>>,
}

impl Presence {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Record a successful login by `session`.
    pub fn attach(&self, user: &str, session: u64) -> Login {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = users.entry(user.to_owned()).or_default();
        let resumed = !entry.sessions.is_empty()
            || entry
                .last_drop
                .is_some_and(|dropped| dropped.elapsed() <= self.grace);
        let superseded = mem::replace(&mut entry.sessions, vec![session]);
        Login {
            resumed,
            superseded,
        }
    }

    /// Record the end of `session`, which had logged in as `user`.
    pub fn detach(&self, user: &str, session: u64, clean: bool) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = users.get_mut(user) else {
            return;
        };
        let Some(index) = entry.sessions.iter().position(|id| *id == session) else {
            return;
        };
        entry.sessions.swap_remove(index);
        if !clean {
            entry.last_drop = Some(Instant::now());
        } else if entry.sessions.is_empty() {
            users.remove(user);
        }
    }

    pub fn is_live(&self, user: &str) -> bool {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.get(user).is_some_and(|entry| !entry.sessions.is_empty())
    }
}
