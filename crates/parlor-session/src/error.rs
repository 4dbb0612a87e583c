//! Error types for the session layer.

use parlor_protocol::{GameType, ThreadId, UserId};

use crate::SessionState;

/// Errors returned by session and registry operations.
///
/// None of these mutate the session they were raised against; a failed
/// call leaves the session exactly as it was. The one exception is
/// [`SessionError::Fatal`], which stops the session for inspection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live session is hosted in this thread.
    #[error("no live session in thread {0}")]
    NotFound(ThreadId),

    /// A live session already occupies the thread, or the same pair is
    /// already playing this game in this guild. Carries the existing
    /// session's thread so the caller can link to it.
    #[error("a live session already exists in thread {0}")]
    DuplicateSession(ThreadId),

    /// The caller is not one of the session's two participants.
    #[error("{0} is not playing in this session")]
    NotParticipant(UserId),

    /// The participant already signaled readiness.
    #[error("{0} is already ready")]
    AlreadyReady(UserId),

    /// The operation needs an active game.
    #[error("the game is not in progress (state: {0})")]
    NotActive(SessionState),

    /// Someone other than the participant at the turn pointer moved.
    #[error("it is not {0}'s turn")]
    NotYourTurn(UserId),

    /// The move was made against an outdated board.
    #[error("stale move: based on ply {got}, session is at ply {expected}")]
    StaleTurn { expected: u64, got: u64 },

    /// A draw proposal is already outstanding.
    #[error("{0} already has a draw proposal open")]
    DrawAlreadyProposed(UserId),

    /// There is no proposal the caller can act on.
    #[error("no draw proposal to act on")]
    NoDrawProposal,

    /// A participant tried to accept their own proposal.
    #[error("you cannot accept your own draw proposal")]
    OwnDrawProposal,

    /// The session has already ended.
    #[error("session in thread {0} has ended")]
    Terminated(ThreadId),

    /// No rule engine is registered for this game.
    #[error("no rule engine registered for {0}")]
    UnknownGame(GameType),

    /// The session actor is gone or its command channel is closed.
    #[error("session in thread {0} is unavailable")]
    Unavailable(ThreadId),

    /// An invariant was violated. The session was stopped and flagged.
    #[error("session invariant violated: {0}")]
    Fatal(String),

    /// Replaying a recorded history did not reproduce the record.
    #[error("replay diverged at ply {ply}: {reason}")]
    ReplayDiverged { ply: u64, reason: String },
}

/// Broad error classes, for callers that only need to know how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller can correct this (wrong turn, already ready, ...).
    Rejected,
    /// The session is over; nothing more can be done.
    Terminated,
    /// Lost a race against another mutation.
    Conflict,
    /// The session or its actor could not be reached.
    Unavailable,
    /// A bug. Needs operator attention.
    Fatal,
}

impl SessionError {
    /// The class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotParticipant(_)
            | Self::AlreadyReady(_)
            | Self::NotActive(_)
            | Self::NotYourTurn(_)
            | Self::DrawAlreadyProposed(_)
            | Self::NoDrawProposal
            | Self::OwnDrawProposal
            | Self::UnknownGame(_) => ErrorClass::Rejected,
            Self::DuplicateSession(_) | Self::StaleTurn { .. } => ErrorClass::Conflict,
            Self::Terminated(_) => ErrorClass::Terminated,
            Self::NotFound(_) | Self::Unavailable(_) => ErrorClass::Unavailable,
            Self::Fatal(_) | Self::ReplayDiverged { .. } => ErrorClass::Fatal,
        }
    }
}
