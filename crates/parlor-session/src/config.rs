//! Session configuration and lifecycle state.

use std::fmt;

use parlor_protocol::Termination;
use parlor_watchdog::WatchdogConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What the watchdog does when a lobby sits idle past the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyTimeoutPolicy {
    /// End as `Forfeited` with no winner; the unready participant (if
    /// exactly one) is recorded as the loser.
    #[default]
    ForfeitUnready,
    /// End as `ForceClosed` with cause `LobbyAbandoned`.
    CloseQuietly,
}

/// Configuration shared by every session the registry opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a session may sit idle before the watchdog forfeits on
    /// behalf of whoever is expected to act. 0 disables the watchdog.
    pub inactivity_timeout_secs: u64,

    /// Lobby behavior on inactivity.
    pub lobby_timeout: LobbyTimeoutPolicy,

    /// Capacity of each session actor's command channel.
    pub command_buffer: usize,

    /// How many ended sessions the registry remembers, so that calls on
    /// their threads fail with `Terminated` rather than `NotFound`.
    pub ended_retention: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 600,
            lobby_timeout: LobbyTimeoutPolicy::default(),
            command_buffer: 64,
            ended_retention: 256,
        }
    }
}

impl SessionConfig {
    /// The watchdog configuration derived from `inactivity_timeout_secs`.
    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig::from_secs(self.inactivity_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// ```text
///          ┌──────────── forfeit / timeout / force-close ─────────────┐
///          │                                                          ▼
/// Lobby ──(both ready)──→ Active ──→ Completed | Forfeited | DrawnByAgreement | ForceClosed
/// ```
///
/// - **Lobby**: both participants must signal readiness. Seats are already
///   drawn; the lobby only gates when play starts.
/// - **Active**: the participant at the turn pointer may move; either may
///   propose a draw or forfeit.
/// - The four terminal states are absorbing. Only reads are allowed after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Lobby,
    Active,
    Completed,
    Forfeited,
    DrawnByAgreement,
    ForceClosed,
}

impl SessionState {
    /// Returns `true` for the absorbing end states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Lobby | Self::Active)
    }

    /// Returns `true` if moves and draw actions are accepted.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The terminal state a termination puts a session in.
    pub fn ended_by(termination: &Termination) -> Self {
        match termination {
            Termination::Completed { .. } => Self::Completed,
            Termination::Forfeited { .. } => Self::Forfeited,
            Termination::DrawnByAgreement => Self::DrawnByAgreement,
            Termination::ForceClosed { .. } => Self::ForceClosed,
        }
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Lobby => matches!(
                target,
                Self::Active | Self::Forfeited | Self::ForceClosed
            ),
            Self::Active => target.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Active => write!(f, "Active"),
            Self::Completed => write!(f, "Completed"),
            Self::Forfeited => write!(f, "Forfeited"),
            Self::DrawnByAgreement => write!(f, "DrawnByAgreement"),
            Self::ForceClosed => write!(f, "ForceClosed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::ForceCloseCause;
    use std::time::Duration;

    #[test]
    fn test_session_state_terminal_states_are_absorbing() {
        let all = [
            SessionState::Lobby,
            SessionState::Active,
            SessionState::Completed,
            SessionState::Forfeited,
            SessionState::DrawnByAgreement,
            SessionState::ForceClosed,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be impossible");
            }
        }
    }

    #[test]
    fn test_session_state_lobby_cannot_complete_or_draw() {
        assert!(SessionState::Lobby.can_transition_to(SessionState::Active));
        assert!(SessionState::Lobby.can_transition_to(SessionState::Forfeited));
        assert!(!SessionState::Lobby.can_transition_to(SessionState::Completed));
        assert!(!SessionState::Lobby.can_transition_to(SessionState::DrawnByAgreement));
    }

    #[test]
    fn test_session_state_ended_by_maps_each_termination() {
        assert_eq!(
            SessionState::ended_by(&Termination::DrawnByAgreement),
            SessionState::DrawnByAgreement
        );
        assert_eq!(
            SessionState::ended_by(&Termination::ForceClosed {
                cause: ForceCloseCause::ThreadDeleted
            }),
            SessionState::ForceClosed
        );
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.inactivity_timeout_secs, 600);
        assert_eq!(config.lobby_timeout, LobbyTimeoutPolicy::ForfeitUnready);
        assert_eq!(config.ended_retention, 256);
        assert_eq!(config.watchdog().timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_session_config_zero_timeout_disables_watchdog() {
        let config = SessionConfig {
            inactivity_timeout_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.watchdog().timeout, None);
    }

    #[test]
    fn test_session_config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "lobby_timeout": "close_quietly" }"#).unwrap();
        assert_eq!(config.lobby_timeout, LobbyTimeoutPolicy::CloseQuietly);
        assert_eq!(config.command_buffer, 64);
    }
}
