//! Session coordination for Parlor.
//!
//! Each live game runs as an isolated Tokio task (actor model) that owns
//! its [`Session`] state machine and inactivity watchdog. The
//! [`SessionRegistry`] maps hosting threads to those actors.
//!
//! # Key types
//!
//! - [`Session`]: the lobby → active → terminal state machine
//! - [`SessionRegistry`]: opens, tracks, and looks up live sessions
//! - [`SessionHandle`]: send commands to a running session actor
//! - [`RuleEngine`]: the per-game rules capability
//! - [`ReplayArchive`]: where finished sessions are recorded

mod actor;
mod archive;
mod config;
mod engine;
mod error;
mod machine;
mod registry;
mod replay;

pub use actor::{NoticeSender, SessionHandle};
pub use archive::{JsonLinesArchive, MemoryArchive, NullArchive, ReplayArchive, SessionRecord};
pub use config::{LobbyTimeoutPolicy, SessionConfig, SessionState};
pub use engine::{GameState, MovePayload, RuleBook, RuleEngine, Verdict};
pub use error::{ErrorClass, SessionError};
pub use machine::{
    MoveAccepted, MoveOutcome, MoveRecord, MoveRequest, ReadyOutcome, Session, SessionSnapshot,
    SessionSpec,
};
pub use registry::SessionRegistry;
pub use replay::{ReplayResult, replay, verify_replay};
