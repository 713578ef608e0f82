//! CAPITALIZED chain functions and constants for Bitcoin-style blocks.
//!
//! This module centralizes the chain-defined functions so they can be
//! imported and used by the concrete types (`header`, `transaction`, `block`).
//!
//! Contents:
//! - Wire and commitment constants
//! - `HASH256`
//! - `MERKLE_ROOT`
//! - `COMPUTE_WITNESS_COMMITMENT`
//! - `CALCULATE_TARGET`
//!
//! All functions are deterministic and free of state. Merkle construction
//! pairs an odd trailing node with itself and uses no domain separation.

#![allow(non_snake_case)]

use crate::header::HeaderError;
use sha2::{Digest, Sha256};

/// 32-byte hash type used across the crate.
pub type Hash32 = [u8; 32];

/// Size of a serialized block header in bytes.
pub const HEADER_SIZE: usize = 80;

/// Script prefix of a witness commitment output: `OP_RETURN`, a 36-byte push
/// and the reserved `aa21a9ed` tag.
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// Length of a witness commitment output script that carries a full commitment.
pub const WITNESS_COMMITMENT_SCRIPT_LEN: usize = WITNESS_COMMITMENT_HEADER.len() + 32;

/// Ratio between the cost of non-witness and witness bytes in block weight.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Largest exponent offset `CALCULATE_TARGET` can place inside 32 bytes.
const MAX_TARGET_EXPONENT: i32 = 29;

/// Double SHA-256 of `data`.
pub fn HASH256(data: &[u8]) -> Hash32 {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Compute a Merkle root over `leaves` using `hash_fn` to combine pairs.
///
/// - Each level hashes `left || right`; an odd trailing node is paired with itself.
/// - A single leaf is returned unchanged.
/// - An empty slice has no root and returns `None`.
pub fn MERKLE_ROOT(leaves: &[Hash32], hash_fn: fn(&[u8]) -> Hash32) -> Option<Hash32> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<Hash32> = leaves.to_vec();
    let mut buf = [0u8; 64];
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            buf[..32].copy_from_slice(left);
            buf[32..].copy_from_slice(right);
            next.push(hash_fn(&buf));
        }
        level = next;
    }
    Some(level[0])
}

/// Bind a witness merkle root to the reserved value found in the coinbase
/// input witness: `HASH256(witness_root || reserved_value)`.
pub fn COMPUTE_WITNESS_COMMITMENT(witness_root: &Hash32, reserved_value: &[u8]) -> Hash32 {
    let mut data = Vec::with_capacity(32 + reserved_value.len());
    data.extend_from_slice(witness_root);
    data.extend_from_slice(reserved_value);
    HASH256(&data)
}

/// Decode a compact `bits` value into a 32-byte big-endian target.
///
/// `exponent = (bits >> 24) - 3`, `mantissa = bits & 0x007fffff`; the three
/// mantissa bytes are written at offset `29 - exponent` of a zeroed buffer.
/// Exponents that would place the mantissa outside the buffer are rejected.
pub fn CALCULATE_TARGET(bits: u32) -> Result<Hash32, HeaderError> {
    let exponent = ((bits >> 24) as i32) - 3;
    if !(0..=MAX_TARGET_EXPONENT).contains(&exponent) {
        return Err(HeaderError::TargetOutOfRange { bits });
    }
    let mantissa = (bits & 0x007f_ffff).to_be_bytes();
    let offset = (MAX_TARGET_EXPONENT - exponent) as usize;
    let mut target = [0u8; 32];
    target[offset..offset + 3].copy_from_slice(&mantissa[1..]);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h32(x: u8) -> Hash32 {
        let mut a = [0u8; 32];
        a[0] = x;
        a
    }

    fn concat(a: &Hash32, b: &Hash32) -> Vec<u8> {
        [a.as_slice(), b.as_slice()].concat()
    }

    #[test]
    fn hash256_known_vector() {
        // Double SHA-256 of the empty string.
        assert_eq!(
            hex::encode(HASH256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn merkle_root_empty_is_none() {
        assert_eq!(MERKLE_ROOT(&[], HASH256), None);
    }

    #[test]
    fn merkle_root_single_is_leaf() {
        let leaf = h32(7);
        assert_eq!(MERKLE_ROOT(&[leaf], HASH256), Some(leaf));
    }

    #[test]
    fn merkle_root_odd_duplicates_last() {
        let (a, b, c) = (h32(1), h32(2), h32(3));
        let ab = HASH256(&concat(&a, &b));
        let cc = HASH256(&concat(&c, &c));
        let expect = HASH256(&concat(&ab, &cc));
        assert_eq!(MERKLE_ROOT(&[a, b, c], HASH256), Some(expect));
    }

    #[test]
    fn merkle_root_uses_given_hash_fn() {
        fn zero_hash(_: &[u8]) -> Hash32 {
            [0u8; 32]
        }
        assert_eq!(MERKLE_ROOT(&[h32(1), h32(2)], zero_hash), Some([0u8; 32]));
    }

    #[test]
    fn witness_commitment_composition() {
        let root = h32(0xaa);
        let reserved = [0u8; 32];
        let expect = HASH256(&concat(&root, &reserved));
        assert_eq!(COMPUTE_WITNESS_COMMITMENT(&root, &reserved), expect);
    }

    #[test]
    fn target_genesis_bits() {
        let target = CALCULATE_TARGET(0x1d00ffff).unwrap();
        assert_eq!(
            hex::encode(target),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn target_drops_sign_bit() {
        let target = CALCULATE_TARGET(0x20ffffff).unwrap();
        assert_eq!(&target[..3], &[0x7f, 0xff, 0xff]);
        assert!(target[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn target_extreme_exponents() {
        // exponent 0: mantissa lands in the last three bytes
        let low = CALCULATE_TARGET(0x03123456).unwrap();
        assert_eq!(&low[29..], &[0x12, 0x34, 0x56]);
        assert!(CALCULATE_TARGET(0x02123456).is_err());
        assert!(CALCULATE_TARGET(0x21123456).is_err());
        match CALCULATE_TARGET(0xff000001).unwrap_err() {
            HeaderError::TargetOutOfRange { bits } => assert_eq!(bits, 0xff000001),
            _ => panic!("unexpected error variant"),
        }
    }
}
