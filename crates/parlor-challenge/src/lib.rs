//! The challenge handshake that precedes every Parlor game session.
//!
//! 1. **Propose**: a user challenges another to a game. The desk checks
//!    that the target is a different, human account ([`AccountDirectory`])
//!    and that the pair is not already playing (duplicate check against the
//!    [`SessionRegistry`](parlor_session::SessionRegistry)).
//! 2. **Confirm**: the challenger confirms, so a single mistyped command
//!    never pings anyone.
//! 3. **Respond**: the target accepts (the session opens) or declines.
//!
//! Either side may cancel before the response, and each phase expires on
//! its own deadline ([`ChallengeConfig`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← routes chat commands to the desk
//!     ↕
//! Challenge Layer (this crate)  ← propose / confirm / respond / cancel
//!     ↕
//! Session Layer (below)  ← opens the session when a challenge is accepted
//! ```

#![allow(async_fn_in_trait)]

mod challenge;
mod config;
mod desk;
mod directory;
mod error;

pub use challenge::{
    Challenge, ChallengeHandle, ChallengeOutcome, ChallengeRequest, ChallengeState,
};
pub use config::ChallengeConfig;
pub use desk::ChallengeDesk;
pub use directory::{AccountDirectory, AccountKind, KnownAccounts};
pub use error::ChallengeError;
