//! Shared vocabulary for Parlor.
//!
//! This crate defines the plain data every other layer speaks:
//!
//! - **Identity** ([`UserId`], [`GuildId`], [`ThreadId`], [`ChallengeId`]):
//!   opaque ids handed to us by the chat platform.
//! - **Games and seats** ([`GameType`], [`Seat`], [`Participant`]).
//! - **Outbound notices** ([`Notice`], [`NoticeEvent`], [`Recipient`]):
//!   what the core asks the presentation layer to render.
//! - **Endings** ([`Termination`], [`ForceCloseCause`], [`ForfeitKind`]).
//! - **Codec** ([`Codec`], [`JsonCodec`]) for archiving records.
//!
//! ```text
//! Presentation layer ← Notice ← Session / Challenge layers ← Protocol (this crate)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ChallengeId, Contestant, ForceCloseCause, ForfeitKind, GameType, GuildId, Notice,
    NoticeEvent, Participant, Recipient, Seat, Termination, ThreadId, UserId,
};
