//! Value codec
//!
//! Serializes an ordered tuple of user values to a self-describing byte
//! string and restores them. The engine treats the bytes as opaque; it never
//! inspects the wire format. A step body that returns a deferred/future-like
//! holder is unwrapped to its terminal value before it ever reaches the
//! codec, simply by `.await`ing it — Rust's `Future` trait is exactly the
//! "deferred holder" the original design calls out, and `async fn` step
//! bodies already resolve to a concrete value before `Codec::encode` sees it.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised while (de)serializing step parameters or return values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serializes and deserializes opaque byte payloads for the execution log.
///
/// Implementations must be stable: bytes produced for a value at time `t`
/// must deserialize to an equivalent value at any later time within the same
/// deployed binary, so that a crashed-and-restarted process can still read
/// rows written before the crash.
///
/// Kept object-safe (no generic methods) so the engine can hold a codec as
/// `Arc<dyn Codec>`; the ergonomic generic `encode`/`decode` callers actually
/// use live on [`CodecExt`], implemented for every `Codec` via an intermediate
/// `serde_json::Value`.
pub trait Codec: Send + Sync + 'static {
    fn encode_value(&self, value: serde_json::Value) -> Result<Vec<u8>, CodecError>;
    fn decode_value(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// Generic encode/decode over any value `serde` knows how to (de)serialize,
/// blanket-implemented for every [`Codec`] including `dyn Codec`.
pub trait CodecExt: Codec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(value).map_err(CodecError::Encode)?;
        self.encode_value(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let value = self.decode_value(bytes)?;
        serde_json::from_value(value).map_err(CodecError::Decode)
    }
}

impl<C: Codec + ?Sized> CodecExt for C {}

/// Length-prefixed-free JSON codec.
///
/// JSON is not the most compact wire format, but it is self-describing,
/// forward-readable across binary versions, and trivially inspectable when
/// debugging a stuck flow by reading `execution_log.db` directly — the
/// properties the original design calls for over a tighter binary encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_value(&self, value: serde_json::Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&value).map_err(CodecError::Encode)
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}
