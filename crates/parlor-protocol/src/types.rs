//! Core types shared by every Parlor layer.
//!
//! Everything in here is plain data: identifiers handed to us by the chat
//! platform, the seat a participant occupies, the outbound notices the
//! presentation layer renders, and the way a finished game ended. None of
//! these types know about tasks, locks, or timers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a `u64` newtype identifier with a prefixed `Display` and a
/// `FromStr` that accepts the bare number (chat platforms hand ids around
/// as decimal strings).
macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map($name).map_err(|_| {
                    ProtocolError::InvalidId(format!(
                        "{} is not a valid {}",
                        s,
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

platform_id!(
    /// A chat-platform account (human or bot).
    UserId,
    "U"
);

platform_id!(
    /// The community (server) a game is played in. The duplicate-session
    /// rule is scoped per guild.
    GuildId,
    "G"
);

platform_id!(
    /// The conversation thread hosting one game. A live session is keyed by
    /// the thread it runs in.
    ThreadId,
    "T"
);

platform_id!(
    /// A pending challenge, unique for the lifetime of the process.
    ChallengeId,
    "C"
);

// ---------------------------------------------------------------------------
// GameType
// ---------------------------------------------------------------------------

/// Which game a session plays. The session core never looks inside a game;
/// this tag only selects the rule engine and scopes the duplicate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Chess,
    RockPaperScissors,
    ConnectFour,
    Cards,
}

impl GameType {
    /// All game types the bot knows how to host.
    pub const ALL: [GameType; 4] = [
        GameType::Chess,
        GameType::RockPaperScissors,
        GameType::ConnectFour,
        GameType::Cards,
    ];

    /// Stable lowercase name, used in logs and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chess => "chess",
            Self::RockPaperScissors => "rock_paper_scissors",
            Self::ConnectFour => "connect_four",
            Self::Cards => "cards",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownGame(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Seats and participants
// ---------------------------------------------------------------------------

/// Which mover a participant is. Assigned once by a random draw when the
/// session is created and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    /// Index into a session's two-element participant array.
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The opposing seat.
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
        }
    }
}

/// A human who takes part in a challenge, before seats are drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contestant {
    pub user: UserId,
    pub name: String,
}

impl Contestant {
    pub fn new(user: UserId, name: impl Into<String>) -> Self {
        Self {
            user,
            name: name.into(),
        }
    }

    /// Binds this contestant to a seat.
    pub fn seated(self, seat: Seat) -> Participant {
        Participant {
            user: self.user,
            name: self.name,
            seat,
        }
    }
}

/// One of the two players in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user: UserId,
    pub name: String,
    pub seat: Seat,
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

/// Why a session was forcibly closed from outside the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ForceCloseCause {
    /// The hosting thread was deleted.
    ThreadDeleted,
    /// A participant left the hosting thread.
    ParticipantLeft { user: UserId },
    /// Nobody got ready in the lobby before the inactivity deadline.
    LobbyAbandoned,
    /// The process is shutting down.
    Shutdown,
    /// An invariant was violated; the session was stopped for inspection.
    Fault { detail: String },
}

impl fmt::Display for ForceCloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadDeleted => write!(f, "thread deleted"),
            Self::ParticipantLeft { user } => write!(f, "{user} left the thread"),
            Self::LobbyAbandoned => write!(f, "lobby abandoned"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Fault { detail } => write!(f, "fault: {detail}"),
        }
    }
}

/// How a forfeit came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForfeitKind {
    /// A participant gave up.
    Voluntary,
    /// The inactivity watchdog forfeited on someone's behalf.
    Inactivity,
}

/// The recorded end of a session. `None` on a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Termination {
    /// The rule engine reported a terminal position. `winner` is `None`
    /// for a drawn position.
    Completed { winner: Option<UserId> },
    /// Someone forfeited (or was forfeited). Forfeits from the lobby have
    /// no winner; `loser` is `None` when nobody in particular is at fault.
    Forfeited {
        loser: Option<UserId>,
        winner: Option<UserId>,
        kind: ForfeitKind,
    },
    /// Both participants agreed to a draw.
    DrawnByAgreement,
    /// The platform closed the session from outside.
    ForceClosed { cause: ForceCloseCause },
}

impl Termination {
    /// The winning user, if the session had one.
    pub fn winner(&self) -> Option<UserId> {
        match self {
            Self::Completed { winner } | Self::Forfeited { winner, .. } => *winner,
            Self::DrawnByAgreement | Self::ForceClosed { .. } => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { winner: Some(w) } => write!(f, "completed, {w} won"),
            Self::Completed { winner: None } => write!(f, "completed, drawn position"),
            Self::Forfeited { loser, kind, .. } => match (loser, kind) {
                (Some(l), ForfeitKind::Voluntary) => write!(f, "{l} forfeited"),
                (Some(l), ForfeitKind::Inactivity) => write!(f, "{l} timed out"),
                (None, _) => write!(f, "abandoned"),
            },
            Self::DrawnByAgreement => write!(f, "drawn by agreement"),
            Self::ForceClosed { cause } => write!(f, "force-closed: {cause}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notices: what the core asks the presentation layer to show
// ---------------------------------------------------------------------------

/// Who a notice is addressed to within its thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Both parties.
    All,
    /// One user.
    User(UserId),
}

/// A prompt or notification for the presentation layer to render.
///
/// The core never formats messages; it only says what happened and who
/// should hear about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub thread: ThreadId,
    pub recipient: Recipient,
    pub event: NoticeEvent,
}

impl Notice {
    pub fn to_all(thread: ThreadId, event: NoticeEvent) -> Self {
        Self {
            thread,
            recipient: Recipient::All,
            event,
        }
    }

    pub fn to_user(thread: ThreadId, user: UserId, event: NoticeEvent) -> Self {
        Self {
            thread,
            recipient: Recipient::User(user),
            event,
        }
    }
}

/// The events carried by a [`Notice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NoticeEvent {
    /// Ask the challenger to confirm before the target is pinged.
    ConfirmChallenge {
        challenge: ChallengeId,
        target: UserId,
        game: GameType,
    },
    /// Ask the target to accept or decline.
    ChallengeReceived {
        challenge: ChallengeId,
        challenger: UserId,
        game: GameType,
    },
    ChallengeDeclined { challenge: ChallengeId },
    ChallengeCanceled { challenge: ChallengeId, by: UserId },
    /// Nobody answered in time. `awaiting` is who was expected to respond.
    ChallengeExpired {
        challenge: ChallengeId,
        awaiting: UserId,
    },
    /// A session was created; both players should ready up.
    SessionOpened {
        game: GameType,
        first: UserId,
        second: UserId,
    },
    PlayerReady { user: UserId },
    GameStarted { first: UserId },
    /// Prompt the participant at the turn pointer. `ply` is the history
    /// length the move will be based on.
    YourTurn { user: UserId, ply: u64 },
    MovePlayed { user: UserId, ply: u64 },
    DrawProposed { by: UserId },
    DrawRescinded { by: UserId },
    /// The inactivity deadline passed; sent out-of-band before the end notice.
    InactivityTimeout { idle: Vec<UserId> },
    SessionEnded { termination: Termination },
}

// =========================================================================
// Tests
// =========================================================================
