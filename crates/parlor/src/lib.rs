//! # Parlor
//!
//! Session coordination for chat-hosted, turn-based two-player games.
//!
//! A presentation layer (usually a chat bot) turns user commands into
//! calls on a [`Coordinator`]: challenges are proposed, confirmed, and
//! answered; accepted challenges open a session in the hosting thread;
//! sessions run lobby → active → terminal, consulting a per-game
//! [`RuleEngine`](parlor_session::RuleEngine) on every move. Everything the
//! players should hear about arrives as [`Notice`](parlor_protocol::Notice)s
//! on one channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//! use serde_json::json;
//!
//! struct Coin;
//!
//! impl RuleEngine for Coin {
//!     fn initial_state(&self) -> GameState {
//!         json!(null)
//!     }
//!
//!     fn apply(&self, _state: &GameState, seat: Seat, mv: &MovePayload) -> Verdict {
//!         match mv.as_str() {
//!             Some("flip") => Verdict::won_by(json!("flipped"), seat),
//!             _ => Verdict::illegal("say flip"),
//!         }
//!     }
//! }
//!
//! # async fn run() -> Result<(), ParlorError> {
//! let config = ParlorConfig::new(UserId(1));
//! let (coordinator, mut notices) = CoordinatorBuilder::new(config.clone())
//!     .rule_engine(GameType::Cards, Coin)
//!     .build(KnownAccounts::new(config.bot_user))?;
//!
//! tokio::spawn(async move {
//!     while let Some(notice) = notices.recv().await {
//!         println!("{notice:?}");
//!     }
//! });
//! # let _ = coordinator;
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
pub mod telemetry;

pub use config::ParlorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, NoticeReceiver};
pub use error::ParlorError;

/// Everything a bot needs to drive Parlor.
pub mod prelude {
    pub use crate::{Coordinator, CoordinatorBuilder, NoticeReceiver, ParlorConfig, ParlorError};
    pub use parlor_challenge::{
        AccountDirectory, AccountKind, Challenge, ChallengeConfig, ChallengeError,
        ChallengeHandle, ChallengeOutcome, ChallengeRequest, ChallengeState, KnownAccounts,
    };
    pub use parlor_protocol::{
        ChallengeId, Contestant, ForceCloseCause, ForfeitKind, GameType, GuildId, Notice,
        NoticeEvent, Participant, Recipient, Seat, Termination, ThreadId, UserId,
    };
    pub use parlor_session::{
        ErrorClass, GameState, JsonLinesArchive, LobbyTimeoutPolicy, MemoryArchive,
        MoveOutcome, MovePayload, MoveRequest, ReadyOutcome, ReplayArchive, RuleBook,
        RuleEngine, SessionConfig, SessionError, SessionHandle, SessionRecord, SessionSnapshot,
        SessionState, Verdict, verify_replay,
    };
}
