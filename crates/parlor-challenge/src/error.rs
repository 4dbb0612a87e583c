//! Error types for the challenge layer.

use parlor_protocol::{ChallengeId, UserId};
use parlor_session::{SessionError, SessionHandle};

use crate::ChallengeState;

/// Errors that can occur while proposing or resolving a challenge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChallengeError {
    /// No open challenge has this id. It may have resolved already.
    #[error("no open challenge {0}")]
    NotFound(ChallengeId),

    /// A user tried to challenge themselves.
    #[error("{0} cannot challenge themselves")]
    SelfChallenge(UserId),

    /// The target is the bot or another non-human account.
    #[error("{0} is not a human player")]
    TargetNotHuman(UserId),

    /// The pair already has a live session of this game in this guild, or
    /// the thread is taken. Carries the existing session so the caller can
    /// link to it instead.
    #[error("a live session already exists in thread {}", .0.thread())]
    DuplicateSession(SessionHandle),

    /// Only the challenger may confirm.
    #[error("only the challenger can confirm, not {0}")]
    NotChallenger(UserId),

    /// Only the target may accept or decline.
    #[error("only the challenged player can respond, not {0}")]
    NotTarget(UserId),

    /// The caller is neither side of the challenge.
    #[error("{0} is not part of this challenge")]
    NotInvolved(UserId),

    /// The step is out of order (e.g. responding before confirmation).
    #[error("challenge is {0}, that step is not allowed now")]
    InvalidState(ChallengeState),

    /// The challenge resolved while the command was in flight.
    #[error("challenge {0} is already resolved")]
    Resolved(ChallengeId),

    /// The challenge task stopped without resolving.
    #[error("challenge {0} is unavailable")]
    Unavailable(ChallengeId),

    /// The account directory could not classify a user.
    #[error("account lookup failed: {0}")]
    Directory(String),

    /// Opening the session failed after the target accepted.
    #[error(transparent)]
    Session(#[from] SessionError),
}
