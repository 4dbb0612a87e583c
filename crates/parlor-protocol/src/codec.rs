//! Codec trait and the JSON implementation.
//!
//! The core owns no wire format, but finished sessions are handed to an
//! archive and opaque game states travel as JSON values. The [`Codec`]
//! trait is the seam an archive uses to turn records into bytes.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` so a codec can live inside a long-running
/// archive shared across session tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`. Compact output, one value per call,
/// which makes it suitable for JSON-lines archives.
///
/// ```rust
/// use parlor_protocol::{Codec, JsonCodec, Notice, NoticeEvent, ThreadId, UserId};
///
/// let notice = Notice::to_all(ThreadId(1), NoticeEvent::PlayerReady { user: UserId(2) });
/// let bytes = JsonCodec.encode(&notice).unwrap();
/// let decoded: Notice = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(notice, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForceCloseCause, Termination};

    #[test]
    fn test_decode_malformed_bytes_returns_decode_error() {
        let result: Result<Termination, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape_returns_decode_error() {
        let result: Result<Termination, _> = JsonCodec.decode(br#"{"outcome":"exploded"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_produces_single_line() {
        let t = Termination::ForceClosed {
            cause: ForceCloseCause::Fault {
                detail: "line one\nline two".into(),
            },
        };
        let bytes = JsonCodec.encode(&t).unwrap();
        assert!(!bytes.contains(&b'\n'), "escaped newlines keep records on one line");
    }
}
