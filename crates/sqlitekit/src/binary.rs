//! Dual-view owner of a binary payload.
//!
//! A [`BinaryValue`] holds one buffer that is either the raw bytes or their
//! SQL-safe encoded form, and converts lazily when the other view is asked
//! for. Conversions are idempotent: asking for the current view returns it
//! unchanged.

use crate::codec;
use crate::error::{Result, SqliteError};

/// A binary payload in exactly one of two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryValue {
    /// The original bytes.
    Raw(Vec<u8>),
    /// The quote-free encoded text form.
    Encoded(Vec<u8>),
}

impl BinaryValue {
    /// An empty raw value.
    pub fn new() -> Self {
        BinaryValue::Raw(Vec::new())
    }

    /// Copy raw bytes in. The buffer reserves worst-case encoding room up
    /// front so the later encode never reallocates.
    pub fn from_raw(bytes: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(codec::encoded_bound(bytes.len()));
        buf.extend_from_slice(bytes);
        BinaryValue::Raw(buf)
    }

    /// Take ownership of an externally-encoded text buffer. The text ends
    /// at its first 0x00 byte, if any.
    pub fn from_encoded(text: impl Into<Vec<u8>>) -> Self {
        let mut buf = text.into();
        if let Some(pos) = buf.iter().position(|&b| b == 0) {
            buf.truncate(pos);
        }
        BinaryValue::Encoded(buf)
    }

    /// Whether the current view is the encoded form.
    pub fn is_encoded(&self) -> bool {
        matches!(self, BinaryValue::Encoded(_))
    }

    /// The encoded view, converting from raw if needed.
    pub fn encoded(&mut self) -> &[u8] {
        if let BinaryValue::Raw(data) = self {
            let enc = codec::encode_to_vec(data);
            *self = BinaryValue::Encoded(enc);
        }
        match self {
            BinaryValue::Encoded(buf) | BinaryValue::Raw(buf) => buf,
        }
    }

    /// The raw view, decoding if needed. Malformed encoded text fails with
    /// a decode error and leaves the value in its encoded state.
    pub fn raw(&mut self) -> Result<&[u8]> {
        if let BinaryValue::Encoded(buf) = self {
            let decoded = codec::decode_binary(buf)
                .ok_or_else(|| SqliteError::misuse("Cannot decode binary"))?;
            *self = BinaryValue::Raw(decoded);
        }
        match self {
            BinaryValue::Encoded(buf) | BinaryValue::Raw(buf) => Ok(buf),
        }
    }

    /// Length of the raw bytes, decoding first if needed.
    pub fn raw_len(&mut self) -> Result<usize> {
        Ok(self.raw()?.len())
    }

    /// Length of the encoded text, encoding first if needed.
    pub fn encoded_len(&mut self) -> usize {
        self.encoded().len()
    }

    /// Reset to an empty raw value, releasing the buffer.
    pub fn clear(&mut self) {
        *self = BinaryValue::Raw(Vec::new());
    }
}

impl Default for BinaryValue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_to_encoded_round_trip() {
        let payload = [0x00, 0x01, 0x27, 0xfe, 0x42];
        let mut value = BinaryValue::from_raw(&payload);
        assert!(!value.is_encoded());

        let encoded = value.encoded().to_vec();
        assert!(value.is_encoded());
        assert!(!encoded.contains(&0x27));
        assert!(!encoded.contains(&0x00));

        assert_eq!(value.raw().unwrap(), &payload);
        assert!(!value.is_encoded());
    }

    #[test]
    fn test_view_switching_is_idempotent() {
        let mut value = BinaryValue::from_raw(b"idempotent");
        let first = value.encoded().to_vec();
        let second = value.encoded().to_vec();
        assert_eq!(first, second);

        assert_eq!(value.raw().unwrap(), b"idempotent");
        assert_eq!(value.raw().unwrap(), b"idempotent");
    }

    #[test]
    fn test_from_encoded_decodes() {
        let encoded = codec::encode_to_vec(b"transplant");
        let mut value = BinaryValue::from_encoded(encoded);
        assert!(value.is_encoded());
        assert_eq!(value.raw_len().unwrap(), 10);
        assert_eq!(value.raw().unwrap(), b"transplant");
    }

    #[test]
    fn test_from_encoded_stops_at_terminator() {
        let mut encoded = codec::encode_to_vec(b"abc");
        let encoded_len = encoded.len();
        encoded.push(0);
        encoded.extend_from_slice(&[0xde, 0xad]);
        let mut value = BinaryValue::from_encoded(encoded);
        assert_eq!(value.encoded_len(), encoded_len);
        assert_eq!(value.raw().unwrap(), b"abc");
    }

    #[test]
    fn test_malformed_decode_keeps_encoded_state() {
        let mut value = BinaryValue::from_encoded(vec![0x50, 0x01, 0x09]);
        let err = value.raw().unwrap_err();
        assert!(err.message().contains("Cannot decode binary"));
        assert!(value.is_encoded());
        // The buffer is untouched and still observable.
        assert_eq!(value.encoded(), &[0x50, 0x01, 0x09]);
    }

    #[test]
    fn test_raw_buffer_reserves_encoding_room() {
        let value = BinaryValue::from_raw(&[0x27; 100]);
        match value {
            BinaryValue::Raw(buf) => {
                assert!(buf.capacity() >= codec::encoded_bound(100));
            }
            BinaryValue::Encoded(_) => unreachable!("fresh value starts raw"),
        }
    }

    #[test]
    fn test_empty_value() {
        let mut value = BinaryValue::new();
        assert_eq!(value.raw_len().unwrap(), 0);
        assert_eq!(value.encoded(), b"x");
        assert_eq!(value.raw().unwrap(), b"");
    }
}
