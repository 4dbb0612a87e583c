//! Challenge deadlines.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long each side of a challenge has to act.
///
/// Both phases have their own deadline: the challenger must confirm
/// within `confirm_timeout_secs` of proposing, and the target must answer
/// within `response_timeout_secs` of the confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub confirm_timeout_secs: u64,
    pub response_timeout_secs: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 30,
            response_timeout_secs: 120,
        }
    }
}

impl ChallengeConfig {
    /// Shortest deadline accepted for either phase.
    pub const MIN_TIMEOUT_SECS: u64 = 1;

    /// Longest deadline accepted for either phase (one day).
    pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    /// Clamps both deadlines into range, warning when a value moves.
    pub fn validated(mut self) -> Self {
        self.confirm_timeout_secs = clamp_secs("confirm_timeout_secs", self.confirm_timeout_secs);
        self.response_timeout_secs =
            clamp_secs("response_timeout_secs", self.response_timeout_secs);
        self
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

fn clamp_secs(field: &'static str, secs: u64) -> u64 {
    let clamped = secs.clamp(
        ChallengeConfig::MIN_TIMEOUT_SECS,
        ChallengeConfig::MAX_TIMEOUT_SECS,
    );
    if clamped != secs {
        tracing::warn!(field, requested = secs, clamped, "challenge timeout out of range, clamping");
    }
    clamped
}
