//! Payload encode/decode pair for session values.
//!
//! Session payloads are arbitrary serializable values; the registry is
//! parameterized over the codec so callers can swap the textual encoding.
//! [`JsonCodec`] is the default.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Codec failure, reported with the backend's message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Serializer/deserializer pair for session payloads.
pub trait PayloadCodec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Default codec: pretty-printed JSON via serde_json.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> PayloadCodec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec_pretty(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
    }
}

/// Adapter for a codec built from two closures, for callers that want a
/// custom encoding without a named type.
pub struct FnCodec<T> {
    encode: Box<dyn Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync>,
    decode: Box<dyn Fn(&[u8]) -> Result<T, CodecError> + Send + Sync>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FnCodec<T> {
    pub fn new(
        encode: impl Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        decode: impl Fn(&[u8]) -> Result<T, CodecError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync> PayloadCodec<T> for FnCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        (self.decode)(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        text: String,
        value: i64,
    }

    #[test]
    fn json_round_trip() {
        let codec = JsonCodec;
        let payload = Payload {
            text: "a".into(),
            value: 1,
        };
        let bytes = codec.encode(&payload).unwrap();
        let back: Payload = codec.decode(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn json_encodes_as_text() {
        let bytes = JsonCodec
            .encode(&Payload {
                text: "hi".into(),
                value: 2,
            })
            .unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"text\""));
    }

    #[test]
    fn decode_garbage_fails() {
        let err = <JsonCodec as PayloadCodec<Payload>>::decode(&JsonCodec, b"not json").unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn fn_codec_round_trip() {
        let codec = FnCodec::new(
            |v: &String| Ok(v.clone().into_bytes()),
            |b| String::from_utf8(b.to_vec()).map_err(|e| CodecError(e.to_string())),
        );
        let bytes = codec.encode(&"plain".to_string()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), "plain");
    }
}
