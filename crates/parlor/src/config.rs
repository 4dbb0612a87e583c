//! Process configuration, loaded from JSON.

use std::path::Path;

use parlor_challenge::ChallengeConfig;
use parlor_protocol::UserId;
use parlor_session::SessionConfig;
use parlor_watchdog::WatchdogConfig;
use serde::{Deserialize, Serialize};

use crate::ParlorError;

fn default_log_filter() -> String {
    "info".to_string()
}

/// Everything a Parlor process needs to know at startup.
///
/// ```json
/// {
///   "bot_user": 4242,
///   "challenge": { "confirm_timeout_secs": 30, "response_timeout_secs": 120 },
///   "session": { "inactivity_timeout_secs": 600, "lobby_timeout": "forfeit_unready" },
///   "log_filter": "info,parlor_session=debug"
/// }
/// ```
///
/// Only `bot_user` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParlorConfig {
    /// The account the bot runs as. It can never be challenged.
    pub bot_user: UserId,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl ParlorConfig {
    /// Defaults for everything except the bot's own id.
    pub fn new(bot_user: UserId) -> Self {
        Self {
            bot_user,
            challenge: ChallengeConfig::default(),
            session: SessionConfig::default(),
            log_filter: default_log_filter(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ParlorError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ParlorError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    /// Reads, parses, and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParlorError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Clamps out-of-range values, logging a warning for each one moved.
    pub fn validated(mut self) -> Self {
        self.challenge = self.challenge.validated();

        let secs = self.session.inactivity_timeout_secs;
        if let Some(timeout) = self.session.watchdog().validated().timeout {
            self.session.inactivity_timeout_secs = timeout.as_secs();
        }
        if secs != self.session.inactivity_timeout_secs {
            tracing::warn!(
                requested = secs,
                clamped = self.session.inactivity_timeout_secs,
                min = WatchdogConfig::MIN_TIMEOUT.as_secs(),
                "inactivity timeout adjusted"
            );
        }

        if self.session.command_buffer == 0 {
            tracing::warn!("command_buffer must be at least 1, using 1");
            self.session.command_buffer = 1;
        }
        self
    }
}
