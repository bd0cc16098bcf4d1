// Reconnection policy and link state.
//
// When the transport fails mid-call, `Connection::reconnect` walks the link
// through `Reconnecting { attempt }` until a fresh `auth` with the saved
// credentials succeeds (back to `Connected`) or the attempt budget runs out
// (`Disconnected`). Attempts are spaced by `Backoff`: exponential growth
// from `initial_delay_ms`, capped at `max_delay_ms`, with +/- `jitter`
// applied to each delay so that many clients dropped by the same outage do
// not reconnect in lockstep.
//
// See also: `connection.rs` for the loop that consumes `Backoff`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tunables for the reconnection loop. Zero delays are valid and used by
/// tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Attempts before giving up. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first attempt. Default: 500 ms.
    pub initial_delay_ms: u64,
    /// Growth factor per failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay. Default: 5 s.
    pub max_delay_ms: u64,
    /// Fraction (0.0 to 1.0) of random spread around each delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter: 0.25,
        }
    }
}

impl ReconnectPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
            ..Self::default()
        }
    }
}

/// Attempt counter plus the next delay to wait.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current = Duration::from_millis(policy.initial_delay_ms);
        Self {
            policy,
            attempts: 0,
            current,
        }
    }

    /// The delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;

        let max = Duration::from_millis(self.policy.max_delay_ms);
        let base = self.current;
        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        let delay = if jitter > 0.0 && !base.is_zero() {
            let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
            scale(base, factor, max)
        } else {
            base
        };

        let multiplier = self.policy.backoff_multiplier.max(1.0);
        self.current = scale(base, multiplier, max);
        Some(delay.min(max))
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = Duration::from_millis(self.policy.initial_delay_ms);
    }
}

/// `d * factor`, saturating at `max`.
fn scale(d: Duration, factor: f64, max: Duration) -> Duration {
    Duration::try_from_secs_f64(d.as_secs_f64() * factor)
        .unwrap_or(max)
        .min(max)
}

/// Where the connection stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}
