//! Error types for the protocol layer.

/// Errors raised while parsing identifiers or encoding records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or a
    /// shape that doesn't match the expected type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A platform identifier could not be parsed.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// The game-type tag is not one the bot hosts.
    #[error("unknown game type: {0}")]
    UnknownGame(String),
}
