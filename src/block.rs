//! Block: header plus optional transaction body, with structural checks.
//!
//! A `Block` parsed from exactly 80 bytes is header-only and cannot answer
//! merkle or witness queries. With a body, `transactions[0]` is the coinbase,
//! which may carry the witness commitment in an `OP_RETURN` output.
//!
//! Parsing never validates. `check_tx_roots()` and `check_proof_of_work()`
//! are explicit; both return `Ok(false)` for a block that is well formed but
//! invalid, and `Err` when the question cannot be asked (no body, bad `bits`).
//!
//! The witness commitment is derived from the coinbase and memoized on first
//! access. Replacing the body through `set_transactions` clears the memo.

use crate::btc_definition::{
    self as definitions, HEADER_SIZE, Hash32, WITNESS_COMMITMENT_HEADER,
    WITNESS_COMMITMENT_SCRIPT_LEN, WITNESS_SCALE_FACTOR,
};
use crate::buffer::{BufferError, BufferReader, BufferWriter, varint};
use crate::config::{CodecConfig, ConfigError};
use crate::header::{BlockHeader, HeaderError};
use crate::transaction::{BlockTransaction, Transaction, TransactionError};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Full block: a header and, unless header-only, its transactions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block<T: BlockTransaction = Transaction> {
    pub header: BlockHeader,
    transactions: Option<Vec<T>>,
    #[serde(skip)]
    witness_commit: OnceLock<Option<Hash32>>,
}

impl<T: BlockTransaction> Default for Block<T> {
    fn default() -> Self {
        Self::header_only(BlockHeader::default())
    }
}

impl<T: BlockTransaction + PartialEq> PartialEq for Block<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl<T: BlockTransaction + Eq> Eq for Block<T> {}

impl<T: BlockTransaction> Block<T> {
    /// A full block; `transactions[0]` is treated as the coinbase.
    pub fn new(header: BlockHeader, transactions: Vec<T>) -> Self {
        Self {
            header,
            transactions: Some(transactions),
            witness_commit: OnceLock::new(),
        }
    }

    /// A block with no body; merkle and witness queries will fail on it.
    pub fn header_only(header: BlockHeader) -> Self {
        Self {
            header,
            transactions: None,
            witness_commit: OnceLock::new(),
        }
    }

    /// Parses a block with the default codec configuration.
    pub fn parse(bytes: &[u8]) -> Result<Self, BlockError> {
        Self::parse_with(bytes, &CodecConfig::default())
    }

    /// Parses a block. Exactly 80 bytes yields a header-only block; otherwise
    /// a transaction count and that many transactions must follow.
    ///
    /// A declared count of zero is accepted and gives `Some(vec![])`, the one
    /// case where a parsed body is empty. Merkle queries on it then fail with
    /// `EmptyMerkleInput`.
    pub fn parse_with(bytes: &[u8], config: &CodecConfig) -> Result<Self, BlockError> {
        config.validate()?;
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::BufferTooSmall { len: bytes.len() }.into());
        }
        let mut reader = BufferReader::new(bytes);
        let header = BlockHeader::read_from(&mut reader)?;
        if bytes.len() == HEADER_SIZE {
            return Ok(Self::header_only(header));
        }

        let count = reader.read_var_len()?;
        // Every transaction takes at least ten bytes.
        let mut transactions = Vec::with_capacity(count.min(reader.remaining() / 10));
        for _ in 0..count {
            let (tx, consumed) = T::parse(reader.rest(), config.allow_witness)?;
            reader.skip(consumed)?;
            transactions.push(tx);
        }

        let remaining = reader.remaining();
        if remaining > 0 {
            if config.reject_trailing_bytes {
                return Err(BlockError::TrailingBytes { remaining });
            }
            debug!("ignoring {remaining} bytes after the last transaction");
        }

        let block = Self::new(header, transactions);
        let commit = block.witness_commit();
        debug!(
            "parsed block: {} transactions, {} bytes, witness commitment {}",
            count,
            reader.offset(),
            if commit.is_some() { "present" } else { "absent" }
        );
        Ok(block)
    }

    /// Parses a block from plain (unprefixed) hex.
    pub fn from_hex(s: &str) -> Result<Self, BlockError> {
        Self::parse(&hex::decode(s)?)
    }

    /// The body, or `None` for a header-only block.
    pub fn transactions(&self) -> Option<&[T]> {
        self.transactions.as_deref()
    }

    fn body(&self) -> Result<&[T], BlockError> {
        self.transactions
            .as_deref()
            .ok_or(BlockError::MissingTransactions)
    }

    /// The first transaction, if the block has a body.
    pub fn coinbase(&self) -> Option<&T> {
        self.transactions.as_ref()?.first()
    }

    /// Replaces the body and forgets any memoized witness commitment.
    pub fn set_transactions(&mut self, transactions: Option<Vec<T>>) {
        self.transactions = transactions;
        self.witness_commit = OnceLock::new();
    }

    /// Populates the witness commitment explicitly. Returns `false` if it was
    /// already set or derived.
    pub fn set_witness_commit(&mut self, commit: Hash32) -> bool {
        self.witness_commit.set(Some(commit)).is_ok()
    }

    /// The witness commitment, derived from the coinbase on first access.
    pub fn witness_commit(&self) -> Option<Hash32> {
        *self.witness_commit.get_or_init(|| self.get_witness_commit())
    }

    /// Decodes the compact `bits` value into a 32-byte big-endian target.
    pub fn calculate_target(bits: u32) -> Result<Hash32, BlockError> {
        Ok(definitions::CALCULATE_TARGET(bits)?)
    }

    /// Merkle root over the transactions' digests.
    ///
    /// In witness mode the root is over witness digests (the coinbase
    /// contributing zeros) and is then bound to the reserved value in the
    /// coinbase input witness, yielding the value a commitment output carries.
    pub fn calculate_merkle_root(
        transactions: &[T],
        for_witness: bool,
    ) -> Result<Hash32, BlockError> {
        if transactions.is_empty() {
            return Err(BlockError::EmptyMerkleInput);
        }
        let reserved = witness_reserved_value(transactions);
        if for_witness && reserved.is_none() {
            return Err(BlockError::NonSegwitWitnessRequest);
        }

        let hashes: Vec<Hash32> = transactions
            .iter()
            .map(|tx| tx.digest(for_witness))
            .collect();
        let root = definitions::MERKLE_ROOT(&hashes, definitions::HASH256)
            .ok_or(BlockError::EmptyMerkleInput)?;

        match reserved {
            Some(reserved) if for_witness => {
                Ok(definitions::COMPUTE_WITNESS_COMMITMENT(&root, reserved))
            }
            _ => Ok(root),
        }
    }

    /// Scans the coinbase outputs for a witness commitment.
    ///
    /// Only blocks whose coinbase input carries a witness are searched. If
    /// several outputs match, the one with the highest index wins. A winning
    /// candidate shorter than 32 bytes is `InvalidCommitmentLength`.
    pub fn try_get_witness_commit(&self) -> Result<Option<Hash32>, BlockError> {
        let transactions = self.body()?;
        if witness_reserved_value(transactions).is_none() {
            return Ok(None);
        }
        let Some(coinbase) = transactions.first() else {
            return Ok(None);
        };

        let mut candidates = 0usize;
        let mut chosen: Option<&[u8]> = None;
        for script in coinbase.output_scripts() {
            if script.starts_with(&WITNESS_COMMITMENT_HEADER) {
                let end = script.len().min(WITNESS_COMMITMENT_SCRIPT_LEN);
                chosen = Some(&script[WITNESS_COMMITMENT_HEADER.len()..end]);
                candidates += 1;
            }
        }
        if candidates > 1 {
            warn!("coinbase has {candidates} witness commitment outputs, using the last");
        }

        match chosen {
            None => Ok(None),
            Some(commit) => match Hash32::try_from(commit) {
                Ok(hash) => Ok(Some(hash)),
                Err(_) => Err(BlockError::InvalidCommitmentLength { len: commit.len() }),
            },
        }
    }

    /// Like `try_get_witness_commit`, treating every failure as "no commitment".
    pub fn get_witness_commit(&self) -> Option<Hash32> {
        match self.try_get_witness_commit() {
            Ok(commit) => commit,
            Err(e @ BlockError::InvalidCommitmentLength { .. }) => {
                warn!("ignoring witness commitment: {e}");
                None
            }
            Err(_) => None,
        }
    }

    /// True if the (memoized) witness commitment is present.
    pub fn has_witness_commit(&self) -> bool {
        self.witness_commit().is_some()
    }

    /// True if any input of any transaction carries a witness element.
    pub fn has_witness(&self) -> bool {
        self.transactions
            .iter()
            .flatten()
            .any(|tx| tx.witness_stacks().any(|stack| !stack.is_empty()))
    }

    /// Block weight with the default scale factor: `3 * base + total`.
    pub fn weight(&self) -> u64 {
        self.scaled_weight(WITNESS_SCALE_FACTOR)
    }

    /// Block weight with the scale factor from `config`.
    pub fn weight_with(&self, config: &CodecConfig) -> Result<u64, BlockError> {
        config.validate()?;
        Ok(self.scaled_weight(config.witness_scale_factor))
    }

    fn scaled_weight(&self, scale: u64) -> u64 {
        let base = self.byte_length(false, false) as u64;
        let total = self.byte_length(false, true) as u64;
        base * (scale - 1) + total
    }

    /// Encoded size: 80 for a header-only encoding, otherwise header, count and
    /// each transaction with or without witness data.
    pub fn byte_length(&self, header_only: bool, allow_witness: bool) -> usize {
        match &self.transactions {
            Some(txs) if !header_only => {
                let body: usize = txs.iter().map(|tx| tx.encoded_size(allow_witness)).sum();
                HEADER_SIZE + varint::encoding_length(txs.len() as u64) + body
            }
            _ => HEADER_SIZE,
        }
    }

    /// Wire encoding; the inverse of `parse`.
    pub fn serialize(&self, header_only: bool) -> Vec<u8> {
        let size = self.byte_length(header_only, true);
        let mut writer = BufferWriter::with_capacity(size);
        self.header.write_to(&mut writer);
        if let Some(txs) = self.transactions.as_ref().filter(|_| !header_only) {
            writer.write_var_int(txs.len() as u64);
            for tx in txs {
                tx.write_to(&mut writer, true);
            }
        }
        debug_assert_eq!(writer.offset(), size);
        writer.into_inner()
    }

    /// `serialize` as lowercase hex.
    pub fn to_hex(&self, header_only: bool) -> String {
        hex::encode(self.serialize(header_only))
    }

    /// Double hash of the 80-byte header.
    pub fn digest(&self) -> Hash32 {
        self.header.digest()
    }

    /// Byte-reversed header digest as lowercase hex.
    pub fn id(&self) -> String {
        self.header.id()
    }

    /// Header timestamp as a UTC date.
    pub fn date(&self) -> DateTime<Utc> {
        self.header.date()
    }

    /// Checks the declared merkle root and, when a witness commitment is
    /// present, the commitment. Witness data without a commitment fails.
    pub fn check_tx_roots(&self) -> Result<bool, BlockError> {
        let has_commit = self.has_witness_commit();
        if !has_commit && self.has_witness() {
            debug!(
                "block {} has witness data but no witness commitment",
                self.id()
            );
            return Ok(false);
        }
        if !self.check_merkle_root()? {
            return Ok(false);
        }
        Ok(!has_commit || self.check_witness_commit()?)
    }

    /// Compares the header's merkle root with one computed from the body.
    pub fn check_merkle_root(&self) -> Result<bool, BlockError> {
        let actual = Self::calculate_merkle_root(self.body()?, false)?;
        let ok = actual == self.header.merkle_root;
        if !ok {
            debug!(
                "merkle root mismatch: header {} calculated {}",
                hex::encode(self.header.merkle_root),
                hex::encode(actual)
            );
        }
        Ok(ok)
    }

    /// Compares the coinbase's witness commitment with one computed from the
    /// body. A block without a commitment is `NonSegwitWitnessRequest`.
    pub fn check_witness_commit(&self) -> Result<bool, BlockError> {
        let transactions = self.body()?;
        let commit = self
            .witness_commit()
            .ok_or(BlockError::NonSegwitWitnessRequest)?;
        let actual = Self::calculate_merkle_root(transactions, true)?;
        let ok = actual == commit;
        if !ok {
            debug!(
                "witness commitment mismatch: coinbase {} calculated {}",
                hex::encode(commit),
                hex::encode(actual)
            );
        }
        Ok(ok)
    }

    /// True if the header digest does not exceed the target its `bits` encode.
    pub fn check_proof_of_work(&self) -> Result<bool, BlockError> {
        Ok(self.header.check_proof_of_work()?)
    }
}

/// First witness element of the coinbase's first input, present only for
/// blocks whose transactions are witness-aware.
fn witness_reserved_value<T: BlockTransaction>(transactions: &[T]) -> Option<&[u8]> {
    let coinbase = transactions.first()?;
    let mut stacks = coinbase.witness_stacks();
    stacks.next()?.first().map(Vec::as_slice)
}

/// Errors that can be returned by block parsing and validation.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Header-level errors, including a buffer shorter than 80 bytes.
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A merkle root was requested over zero transactions.
    #[error("cannot compute merkle root for zero transactions")]
    EmptyMerkleInput,

    /// A witness root was requested but the coinbase input has no witness.
    #[error("cannot compute witness commit for non-segwit block")]
    NonSegwitWitnessRequest,

    /// The selected commitment output carries fewer than 32 bytes.
    #[error("witness commitment must be 32 bytes, found {len}")]
    InvalidCommitmentLength { len: usize },

    /// A body query was made on a header-only block.
    #[error("block has no transactions")]
    MissingTransactions,

    /// Strict decoding found bytes after the last transaction.
    #[error("{remaining} unexpected bytes after the last transaction")]
    TrailingBytes { remaining: usize },

    #[error("invalid block hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
