//! btc-block crate library entry point.
//!
//! This crate parses, serializes and structurally validates Bitcoin-style
//! blocks: an 80-byte header plus an optional transaction body.
//!
//! Modules:
//! - `btc_definition`: CAPITALIZED chain functions (double hash, Merkle,
//!   witness commitment, target).
//! - `buffer`: little-endian byte cursors and var-int helpers.
//! - `serde_hex`: Serde helpers to encode/decode byte fields as 0x-prefixed hex.
//! - `config`: codec options (witness decoding, trailing bytes, weight scale).
//! - `transaction`, `header`, `block`: core types; `Block` drives parsing and validation.

pub mod block;
pub mod btc_definition;
pub mod buffer;
pub mod config;
pub mod header;
pub mod serde_hex;
pub mod transaction;

pub use block::{Block, BlockError};
pub use config::CodecConfig;
pub use header::{BlockHeader, HeaderError};
pub use transaction::{BlockTransaction, Transaction, TxInput, TxOutput};
