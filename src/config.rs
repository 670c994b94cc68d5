//! Configuration of key generation and ballot validation.

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    group::{GenerationError, GroupParams},
    Keypair, SecretExponentRange,
};

/// Error loading or validating [`Config`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Configuration could not be parsed.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// Bit length of the group modulus is too small.
    #[error("modulus bit length {actual} is less than the minimum {min}")]
    BitLengthTooSmall {
        /// Configured bit length.
        actual: u64,
        /// Minimum supported bit length.
        min: u64,
    },
    /// Prime candidate bound is zero.
    #[error("`maxPrimeCandidates` must be positive if specified")]
    ZeroCandidateBound,
}

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{config::Config, SecretExponentRange};
/// let config = Config::from_json(r#"{
///     "keys": { "bitLength": 1024, "secretExponentRange": "modulus" },
///     "pipeline": { "acceptAfterEnd": true }
/// }"#)?;
/// assert_eq!(config.keys.bit_length, 1024);
/// assert_eq!(config.keys.secret_exponent_range, SecretExponentRange::Modulus);
/// assert!(config.pipeline.verify_proofs);
/// # Ok::<_, evote_elgamal::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Key generation settings.
    pub keys: KeyConfig,
    /// Ballot validation settings.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Parses and validates configuration from JSON. Missing fields take default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or the configuration is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keys.validate()
    }
}

/// Key generation settings for elections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyConfig {
    /// Bit length of the safe prime modulus. Default: 2048.
    pub bit_length: u64,
    /// Range of the secret exponent.
    pub secret_exponent_range: SecretExponentRange,
    /// Maximum number of prime candidates to sample before giving up. `None` means
    /// the search is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prime_candidates: Option<u64>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            bit_length: 2_048,
            secret_exponent_range: SecretExponentRange::default(),
            max_prime_candidates: None,
        }
    }
}

impl KeyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bit_length < GroupParams::MIN_BIT_LENGTH {
            return Err(ConfigError::BitLengthTooSmall {
                actual: self.bit_length,
                min: GroupParams::MIN_BIT_LENGTH,
            });
        }
        if self.max_prime_candidates == Some(0) {
            return Err(ConfigError::ZeroCandidateBound);
        }
        Ok(())
    }

    /// Generates a fresh group and a keypair over it according to these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the group cannot be generated.
    pub fn generate_keypair<R: CryptoRng + RngCore>(
        &self,
        rng: &mut R,
    ) -> Result<Keypair, GenerationError> {
        let params = GroupParams::generate_with_limit(self.bit_length, self.max_prime_candidates, rng)?;
        Ok(Keypair::generate_with_range(
            &params,
            self.secret_exponent_range,
            rng,
        ))
    }
}

/// Ballot validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Verify row proofs of submitted ballots. Default: `true`.
    pub verify_proofs: bool,
    /// Accept ballots for elections that have already ended. Default: `false`.
    pub accept_after_end: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_proofs: true,
            accept_after_end: false,
        }
    }
}
