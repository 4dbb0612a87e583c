//! Unified error type for Parlor.

use parlor_challenge::ChallengeError;
use parlor_protocol::ProtocolError;
use parlor_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// Encoding, decoding, or parsing an identifier failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation was rejected or the session is gone.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A challenge step was rejected or the challenge is gone.
    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    /// Configuration could not be loaded or is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParlorError {
    /// The session error behind this one, including one raised while
    /// opening a session for an accepted challenge.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(e) | Self::Challenge(ChallengeError::Session(e)) => Some(e),
            _ => None,
        }
    }
}
