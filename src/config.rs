//! Block codec configuration.
//!
//! `CodecConfig` controls how strictly a block buffer is decoded and how
//! witness bytes are discounted when computing weight. The defaults match
//! network behaviour: witness-aware decoding, trailing bytes tolerated, and a
//! scale factor of four.
//!
//! Validation surfaces settings that would make weight meaningless.

use crate::btc_definition::WITNESS_SCALE_FACTOR;
use thiserror::Error;

/// Configuration for block decoding and weight accounting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    /// Decode transactions in the segregated witness layout when flagged.
    pub allow_witness: bool,
    /// Fail if bytes remain after the declared transactions.
    pub reject_trailing_bytes: bool,
    /// Cost of a non-witness byte relative to a witness byte.
    pub witness_scale_factor: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            allow_witness: true,
            reject_trailing_bytes: false,
            witness_scale_factor: WITNESS_SCALE_FACTOR,
        }
    }
}

impl CodecConfig {
    /// Create a new config.
    pub fn new(
        allow_witness: bool,
        reject_trailing_bytes: bool,
        witness_scale_factor: u64,
    ) -> Self {
        Self {
            allow_witness,
            reject_trailing_bytes,
            witness_scale_factor,
        }
    }

    /// Strict decoding: the buffer must end exactly after the last transaction.
    pub fn strict() -> Self {
        Self {
            reject_trailing_bytes: true,
            ..Self::default()
        }
    }

    /// Validate the config.
    ///
    /// Policy: a zero scale factor would make non-witness bytes cost less than
    /// nothing, so it is rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.witness_scale_factor == 0 {
            return Err(ConfigError::ZeroWitnessScaleFactor);
        }
        Ok(())
    }
}

/// Errors that can be produced by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `witness_scale_factor` must be at least one.
    #[error("witness scale factor must be at least 1")]
    ZeroWitnessScaleFactor,
}
