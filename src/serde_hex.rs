//! Serde helpers to serialize/deserialize block byte fields as 0x-prefixed hex strings.
//!
//! - `hex_vec`: scripts and other `Vec<u8>` of any length.
//! - `hex32`: digests (`[u8; 32]`) with exact length enforcement.
//! - `hex_vec_list`: witness stacks (`Vec<Vec<u8>>`) as a JSON array of hex strings.
//!
//! Output is always lowercase; input must carry the `0x` prefix.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

/// Errors that can occur during hex (de)serialization.
#[derive(Debug, Error)]
pub enum HexSerdeError {
    /// Input string must begin with `0x` prefix.
    #[error("missing 0x prefix")]
    MissingPrefix,

    /// Input contained non-hex characters or odd-length digits.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    /// For fixed-size arrays: decoded byte length did not match the expected size.
    #[error("length mismatch: expected {expected} bytes, got {actual} bytes")]
    LengthMismatch { expected: usize, actual: usize },
}

fn encode_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_prefixed(s: &str) -> Result<Vec<u8>, HexSerdeError> {
    let digits = s.strip_prefix("0x").ok_or(HexSerdeError::MissingPrefix)?;
    hex::decode(digits)
        .map_err(|e| HexSerdeError::InvalidHex(e.to_string()))
}

/// Serde helpers for `Vec<u8>` as 0x-hex.
pub mod hex_vec {
    use super::*;

    /// Serialize bytes as a lowercase 0x-hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_prefixed(bytes))
    }

    /// Deserialize a 0x-hex string of any length.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_prefixed(&s).map_err(D::Error::custom)
    }
}

/// Serde helpers for `[u8; 32]` as 0x-hex.
pub mod hex32 {
    use super::*;

    /// Serialize a digest as a 66-character 0x-hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_prefixed(bytes))
    }

    /// Deserialize a digest, rejecting anything that is not exactly 32 bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_prefixed(&s).map_err(D::Error::custom)?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            D::Error::custom(HexSerdeError::LengthMismatch {
                expected: 32,
                actual: bytes.len(),
            })
        })
    }
}

/// Serde helpers for `Vec<Vec<u8>>` as an array of 0x-hex strings.
pub mod hex_vec_list {
    use super::*;
    use serde::ser::SerializeSeq;

    /// Serialize each item as a 0x-hex string inside a sequence.
    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&encode_prefixed(item))?;
        }
        seq.end()
    }

    /// Deserialize a sequence of 0x-hex strings; empty items are kept.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| decode_prefixed(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct VecWrap(#[serde(with = "crate::serde_hex::hex_vec")] Vec<u8>);

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Arr32Wrap(#[serde(with = "crate::serde_hex::hex32")] [u8; 32]);

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct StackWrap(#[serde(with = "crate::serde_hex::hex_vec_list")] Vec<Vec<u8>>);

    #[test]
    fn vec_round_trip() {
        let v = VecWrap(vec![0x6a, 0x24, 0xaa, 0xff]);
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, "\"0x6a24aaff\"");
        let back: VecWrap = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn arr32_round_trip() {
        let mut a = [0u8; 32];
        a[0] = 0xde;
        a[31] = 0xad;
        let w = Arr32Wrap(a);
        let s = serde_json::to_string(&w).unwrap();
        assert_eq!(s.len(), 2 + 2 + 64);
        let back: Arr32Wrap = serde_json::from_str(&s).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn stack_round_trip_keeps_empty_items() {
        let w = StackWrap(vec![vec![], vec![0x01, 0x02]]);
        let s = serde_json::to_string(&w).unwrap();
        assert_eq!(s, "[\"0x\",\"0x0102\"]");
        let back: StackWrap = serde_json::from_str(&s).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn vec_rejects_missing_prefix() {
        let err = serde_json::from_str::<VecWrap>("\"deadbeef\"").unwrap_err();
        assert!(err.to_string().contains("missing 0x prefix"));
    }

    #[test]
    fn arr32_wrong_length_rejected() {
        let s = format!("\"0x{}\"", "00".repeat(31));
        let err = serde_json::from_str::<Arr32Wrap>(&s).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn invalid_hex_char_rejected() {
        let err = serde_json::from_str::<StackWrap>("[\"0xzz\"]").unwrap_err();
        assert!(err.to_string().contains("invalid hex encoding"));
    }
}
