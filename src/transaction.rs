//! Transactions as carried in a block body.
//!
//! A `Transaction` is decoded from the legacy layout or, when the
//! `0x00 0x01` marker/flag pair follows the version, from the segregated
//! witness layout with per-input witness stacks appended after the outputs.
//!
//! `BlockTransaction` is the contract a `Block` needs from its transactions:
//! decode from a slice reporting bytes consumed, digest, size, encode, and
//! read-only views of the witness stacks and output scripts.

use crate::btc_definition::{self as definitions, Hash32, WITNESS_SCALE_FACTOR};
use crate::buffer::{self, BufferError, BufferReader, BufferWriter, varint};
use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

/// Behaviour a block requires from the transactions it contains.
pub trait BlockTransaction: Sized {
    /// Decode one transaction from the start of `bytes`, returning it with the
    /// number of bytes consumed. Bytes after the transaction are ignored.
    fn parse(bytes: &[u8], allow_witness: bool) -> Result<(Self, usize), TransactionError>;

    /// Non-witness digest (txid order), or the witness digest when `for_witness`.
    fn digest(&self, for_witness: bool) -> Hash32;

    /// Encoded size with or without witness data.
    fn encoded_size(&self, allow_witness: bool) -> usize;

    /// Append the encoding to `writer`.
    fn write_to(&self, writer: &mut BufferWriter, allow_witness: bool);

    /// Witness stack of each input, in input order.
    fn witness_stacks(&self) -> impl Iterator<Item = &[Vec<u8>]>;

    /// Locking script of each output, in output order.
    fn output_scripts(&self) -> impl Iterator<Item = &[u8]>;
}

/// Reference to a previous output being spent, plus its unlocking data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Previous transaction digest in internal byte order.
    #[serde(with = "crate::serde_hex::hex32")]
    pub hash: Hash32,
    pub index: u32,
    #[serde(with = "crate::serde_hex::hex_vec")]
    pub script: Vec<u8>,
    pub sequence: u32,
    #[serde(with = "crate::serde_hex::hex_vec_list", default)]
    pub witness: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in satoshis.
    pub value: u64,
    #[serde(with = "crate::serde_hex::hex_vec")]
    pub script: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            locktime: 0,
        }
    }
}

impl Transaction {
    /// Decode a transaction that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let (tx, consumed) = <Self as BlockTransaction>::parse(bytes, true)?;
        if consumed != bytes.len() {
            return Err(TransactionError::TrailingBytes {
                remaining: bytes.len() - consumed,
            });
        }
        Ok(tx)
    }

    /// Decode a transaction from plain (unprefixed) hex.
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        Self::from_bytes(&hex::decode(s)?)
    }

    /// True if any input carries at least one witness element.
    pub fn has_witnesses(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// A coinbase has exactly one input, spending the all-zero digest.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].hash == [0u8; 32]
    }

    /// Encode the transaction, with witness data when `allow_witness` and present.
    pub fn serialize(&self, allow_witness: bool) -> Vec<u8> {
        let mut writer = BufferWriter::with_capacity(self.encoded_size(allow_witness));
        self.write_to(&mut writer, allow_witness);
        writer.into_inner()
    }

    /// Full encoding as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize(true))
    }

    /// Byte-reversed non-witness digest as lowercase hex.
    pub fn id(&self) -> String {
        let mut digest = self.digest(false);
        digest.reverse();
        hex::encode(digest)
    }

    /// Base size times three plus total size.
    pub fn weight(&self) -> u64 {
        let base = self.encoded_size(false) as u64;
        let total = self.encoded_size(true) as u64;
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    fn decode(
        reader: &mut BufferReader<'_>,
        allow_witness: bool,
    ) -> Result<Self, TransactionError> {
        let version = reader.read_i32()?;

        let rest = reader.rest();
        let segwit = allow_witness
            && rest.len() >= 2
            && rest[0] == WITNESS_MARKER
            && rest[1] == WITNESS_FLAG;
        if segwit {
            reader.skip(2)?;
        }

        let input_count = reader.read_var_len()?;
        let mut inputs = Vec::with_capacity(input_count.min(reader.remaining() / 41));
        for _ in 0..input_count {
            inputs.push(TxInput {
                hash: reader.read_array()?,
                index: reader.read_u32()?,
                script: reader.read_var_slice()?.to_vec(),
                sequence: reader.read_u32()?,
                witness: Vec::new(),
            });
        }

        let output_count = reader.read_var_len()?;
        let mut outputs = Vec::with_capacity(output_count.min(reader.remaining() / 9));
        for _ in 0..output_count {
            outputs.push(TxOutput {
                value: reader.read_u64()?,
                script: reader.read_var_slice()?.to_vec(),
            });
        }

        if segwit {
            for input in inputs.iter_mut() {
                input.witness = reader.read_vector()?;
            }
            if inputs.iter().all(|i| i.witness.is_empty()) {
                return Err(TransactionError::SuperfluousWitness);
            }
        }

        let locktime = reader.read_u32()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            locktime,
        })
    }
}

impl BlockTransaction for Transaction {
    fn parse(bytes: &[u8], allow_witness: bool) -> Result<(Self, usize), TransactionError> {
        let mut reader = BufferReader::new(bytes);
        let tx = Self::decode(&mut reader, allow_witness)?;
        trace!(
            "parsed transaction: {} inputs, {} outputs, {} bytes",
            tx.inputs.len(),
            tx.outputs.len(),
            reader.offset()
        );
        Ok((tx, reader.offset()))
    }

    fn digest(&self, for_witness: bool) -> Hash32 {
        if for_witness && self.is_coinbase() {
            return [0u8; 32];
        }
        definitions::HASH256(&self.serialize(for_witness))
    }

    fn encoded_size(&self, allow_witness: bool) -> usize {
        let segwit = allow_witness && self.has_witnesses();
        let fixed = if segwit { 10 } else { 8 };
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| 40 + buffer::var_slice_size(&i.script))
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + buffer::var_slice_size(&o.script))
            .sum();
        let witness: usize = if segwit {
            self.inputs
                .iter()
                .map(|i| buffer::vector_size(&i.witness))
                .sum()
        } else {
            0
        };
        fixed
            + varint::encoding_length(self.inputs.len() as u64)
            + varint::encoding_length(self.outputs.len() as u64)
            + inputs
            + outputs
            + witness
    }

    fn write_to(&self, writer: &mut BufferWriter, allow_witness: bool) {
        let segwit = allow_witness && self.has_witnesses();
        writer.write_i32(self.version);
        if segwit {
            writer.write_u8(WITNESS_MARKER);
            writer.write_u8(WITNESS_FLAG);
        }

        writer.write_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            writer.write_slice(&input.hash);
            writer.write_u32(input.index);
            writer.write_var_slice(&input.script);
            writer.write_u32(input.sequence);
        }

        writer.write_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            writer.write_u64(output.value);
            writer.write_var_slice(&output.script);
        }

        if segwit {
            for input in &self.inputs {
                writer.write_vector(&input.witness);
            }
        }
        writer.write_u32(self.locktime);
    }

    fn witness_stacks(&self) -> impl Iterator<Item = &[Vec<u8>]> {
        self.inputs.iter().map(|i| i.witness.as_slice())
    }

    fn output_scripts(&self) -> impl Iterator<Item = &[u8]> {
        self.outputs.iter().map(|o| o.script.as_slice())
    }
}

/// Errors produced while decoding a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Propagate cursor errors transparently.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The witness marker was present but every input's witness stack is empty.
    #[error("transaction has superfluous witness data")]
    SuperfluousWitness,

    /// A standalone transaction decode left bytes unread.
    #[error("transaction has {remaining} unexpected trailing bytes")]
    TrailingBytes { remaining: usize },

    #[error("invalid transaction hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coinbase transaction of the genesis block.
    const GENESIS_COINBASE_HEX: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

    fn segwit_spend() -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TxInput {
                hash: [0x11; 32],
                index: 1,
                script: vec![],
                sequence: 0xffff_fffd,
                witness: vec![vec![0x30; 71], vec![0x02; 33]],
            }],
            outputs: vec![TxOutput {
                value: 90_000,
                script: vec![0x00, 0x14, 0xab],
            }],
            locktime: 0,
        }
    }

    #[test]
    fn genesis_coinbase_decodes() {
        let tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        assert!(tx.is_coinbase());
        assert!(!tx.has_witnesses());
        assert_eq!(tx.outputs[0].value, 50 * 100_000_000);
        assert_eq!(tx.encoded_size(true), GENESIS_COINBASE_HEX.len() / 2);
        assert_eq!(tx.to_hex(), GENESIS_COINBASE_HEX);
        assert_eq!(
            tx.id(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn coinbase_witness_digest_is_zero() {
        let mut tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        tx.inputs[0].witness = vec![vec![0u8; 32]];
        assert_eq!(tx.digest(true), [0u8; 32]);
        assert_ne!(tx.digest(false), [0u8; 32]);
    }

    #[test]
    fn segwit_sizes_and_digests() {
        let tx = segwit_spend();
        let base = tx.encoded_size(false);
        let total = tx.encoded_size(true);
        // marker + flag + one stack of two items (1 + 72 + 34)
        assert_eq!(total - base, 2 + 1 + 72 + 34);
        assert_eq!(tx.serialize(false).len(), base);
        assert_eq!(tx.serialize(true).len(), total);
        assert_eq!(tx.weight(), (base * 3 + total) as u64);
        assert_ne!(tx.digest(true), tx.digest(false));
        assert_eq!(tx.digest(false), definitions::HASH256(&tx.serialize(false)));
    }

    #[test]
    fn parse_reports_consumed_and_ignores_tail() {
        let tx = segwit_spend();
        let mut bytes = tx.serialize(true);
        let len = bytes.len();
        bytes.extend_from_slice(&[0xde, 0xad]);
        let (parsed, consumed) = Transaction::parse(&bytes, true).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(consumed, len);

        match Transaction::from_bytes(&bytes).unwrap_err() {
            TransactionError::TrailingBytes { remaining } => assert_eq!(remaining, 2),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn superfluous_witness_rejected() {
        let mut tx = segwit_spend();
        let mut bytes = tx.serialize(true);
        // rewrite the single witness stack as empty: drop its bytes, keep the count 0
        tx.inputs[0].witness.clear();
        let legacy = tx.serialize(false);
        bytes.truncate(2 + legacy.len() - 4);
        bytes.push(0);
        bytes.extend_from_slice(&tx.locktime.to_le_bytes());
        assert!(matches!(
            Transaction::from_bytes(&bytes),
            Err(TransactionError::SuperfluousWitness)
        ));
    }

    #[test]
    fn truncated_transaction_fails() {
        let bytes = hex::decode(&GENESIS_COINBASE_HEX[..100]).unwrap();
        assert!(matches!(
            Transaction::parse(&bytes, true),
            Err(TransactionError::Buffer(BufferError::UnexpectedEof { .. }))
        ));
    }

    #[test]
    fn json_uses_prefixed_hex() {
        let tx = segwit_spend();
        let v = serde_json::to_value(&tx).unwrap();
        assert_eq!(v["outputs"][0]["script"], "0x0014ab");
        assert_eq!(v["inputs"][0]["witness"].as_array().unwrap().len(), 2);
        let back: Transaction = serde_json::from_value(v).unwrap();
        assert_eq!(back, tx);
    }
}
