//! Block header: the fixed 80-byte prefix of every block.
//!
//! The header owns its identity (`digest`, `id`) and the proof-of-work check,
//! since both depend only on these six fields. All integers are little-endian
//! on the wire; digests are stored exactly as they appear on the wire.

use crate::btc_definition::{self as definitions, HEADER_SIZE, Hash32};
use crate::buffer::{BufferError, BufferReader, BufferWriter};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header for a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    /// Digest of the previous block header, wire byte order.
    #[serde(with = "crate::serde_hex::hex32")]
    pub prev_hash: Hash32,
    /// Merkle root over the non-witness transaction digests.
    #[serde(with = "crate::serde_hex::hex32")]
    pub merkle_root: Hash32,
    /// Seconds since the Unix epoch.
    pub timestamp: u32,
    /// Compact-encoded proof-of-work target.
    pub bits: u32,
    pub nonce: u32,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            version: 1,
            prev_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            timestamp: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

impl BlockHeader {
    /// Reads the header from the first 80 bytes of `bytes`; anything after is ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::BufferTooSmall { len: bytes.len() });
        }
        let mut reader = BufferReader::new(bytes);
        Self::read_from(&mut reader)
    }

    /// Parses a header from plain (unprefixed) hex.
    pub fn from_hex(s: &str) -> Result<Self, HeaderError> {
        Self::parse(&hex::decode(s)?)
    }

    pub(crate) fn read_from(reader: &mut BufferReader<'_>) -> Result<Self, HeaderError> {
        Ok(Self {
            version: reader.read_i32()?,
            prev_hash: reader.read_array()?,
            merkle_root: reader.read_array()?,
            timestamp: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }

    pub(crate) fn write_to(&self, writer: &mut BufferWriter) {
        writer.write_i32(self.version);
        writer.write_slice(&self.prev_hash);
        writer.write_slice(&self.merkle_root);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.bits);
        writer.write_u32(self.nonce);
    }

    /// The 80-byte wire encoding.
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = BufferWriter::with_capacity(HEADER_SIZE);
        self.write_to(&mut writer);
        writer.into_inner()
    }

    /// The 80-byte encoding as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Double hash of the 80-byte encoding.
    pub fn digest(&self) -> Hash32 {
        definitions::HASH256(&self.serialize())
    }

    /// Byte-reversed digest as lowercase hex, the form block explorers display.
    pub fn id(&self) -> String {
        let mut digest = self.digest();
        digest.reverse();
        hex::encode(digest)
    }

    /// Block time in UTC.
    pub fn date(&self) -> DateTime<Utc> {
        // every u32 second count is representable
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
            .unwrap_or_default()
    }

    /// Decodes `bits` into a 32-byte big-endian target.
    pub fn calculate_target(&self) -> Result<Hash32, HeaderError> {
        definitions::CALCULATE_TARGET(self.bits)
    }

    /// True when the reversed digest, read big-endian, does not exceed the target.
    pub fn check_proof_of_work(&self) -> Result<bool, HeaderError> {
        let target = self.calculate_target()?;
        let mut hash = self.digest();
        hash.reverse();
        let ok = hash <= target;
        if !ok {
            debug!(
                "header {} does not meet target for bits {:#010x}",
                hex::encode(hash),
                self.bits
            );
        }
        Ok(ok)
    }
}

/// Errors that can be emitted by header-level parsing or checks.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Fewer than 80 bytes were supplied.
    #[error("buffer too small: {len} bytes, header needs 80")]
    BufferTooSmall { len: usize },

    /// The `bits` exponent places the mantissa outside the 32-byte target.
    #[error("compact target {bits:#010x} is out of range")]
    TargetOutOfRange { bits: u32 },

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("invalid header hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
