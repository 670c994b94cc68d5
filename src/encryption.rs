//! `Ciphertext` and closely related types.

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

use std::{collections::HashMap, fmt};

use crate::{group::GroupParams, serde::DecimalHelper};

/// Error encrypting a plaintext.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EncryptionError {
    /// Plaintext is zero or not less than the modulus.
    #[error("plaintext must lie in [1, p)")]
    PlaintextOutOfRange,
    /// Supplied randomness is zero or not less than the modulus.
    #[error("encryption randomness must lie in [1, p)")]
    RandomnessOutOfRange,
    /// Ciphertext components are not residues modulo `p`.
    #[error("ciphertext components must lie in [1, p)")]
    MalformedCiphertext,
}

/// Ciphertext for ElGamal encryption: the pair `(alpha, beta) = (g^r, m * h^r) mod p`
/// for plaintext element `m`, randomness `r` and public value `h`.
///
/// Ciphertexts are partially homomorphic: the component-wise product of two ciphertexts
/// (see [`Self::combine()`]) encrypts the product of plaintext elements. With exponential
/// encoding `m = g^v`, this corresponds to adding the encoded values.
///
/// Ciphertexts are serialized as `{ "alpha", "beta" }` with decimal string components.
/// Deserialization does not check that the components belong to a specific group;
/// use [`Self::is_well_formed()`] for that.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    #[serde(with = "DecimalHelper")]
    pub(crate) alpha: BigUint,
    #[serde(with = "DecimalHelper")]
    pub(crate) beta: BigUint,
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ciphertext")
            .field("alpha", &format_args!("{:x}", self.alpha))
            .field("beta", &format_args!("{:x}", self.beta))
            .finish()
    }
}

impl Ciphertext {
    /// Creates a ciphertext from its components without any checks.
    pub fn new(alpha: BigUint, beta: BigUint) -> Self {
        Self { alpha, beta }
    }

    /// Returns the neutral ciphertext `(1, 1)`, which "encrypts" the identity
    /// without blinding.
    pub fn identity() -> Self {
        Self {
            alpha: BigUint::one(),
            beta: BigUint::one(),
        }
    }

    /// Returns the random component `alpha = g^r`.
    pub fn alpha(&self) -> &BigUint {
        &self.alpha
    }

    /// Returns the blinded component `beta = m * h^r`.
    pub fn beta(&self) -> &BigUint {
        &self.beta
    }

    /// Checks that both components are residues in `[1, p)`.
    pub fn is_well_formed(&self, params: &GroupParams) -> bool {
        params.is_residue(&self.alpha) && params.is_residue(&self.beta)
    }

    /// Homomorphically combines this ciphertext with `other` via component-wise
    /// multiplication modulo `p`.
    pub fn combine(&self, other: &Self, params: &GroupParams) -> Self {
        Self {
            alpha: params.mul(&self.alpha, &other.alpha),
            beta: params.mul(&self.beta, &other.beta),
        }
    }

    pub(crate) fn combine_assign(&mut self, other: &Self, params: &GroupParams) {
        self.alpha = params.mul(&self.alpha, &other.alpha);
        self.beta = params.mul(&self.beta, &other.beta);
    }
}

/// [`Ciphertext`] together with the randomness used to produce it.
///
/// The randomness is secret; knowing it allows to decrypt the ciphertext. It is retained
/// to construct zero-knowledge proofs and auditable records.
#[derive(Clone)]
pub struct ExtendedCiphertext {
    pub(crate) inner: Ciphertext,
    pub(crate) randomness: BigUint,
}

impl fmt::Debug for ExtendedCiphertext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExtendedCiphertext")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ExtendedCiphertext {
    /// Returns the ciphertext.
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.inner
    }

    /// Returns the randomness used for encryption.
    pub fn randomness(&self) -> &BigUint {
        &self.randomness
    }

    /// Splits this into the ciphertext and randomness.
    pub fn into_parts(self) -> (Ciphertext, BigUint) {
        (self.inner, self.randomness)
    }
}

impl From<ExtendedCiphertext> for Ciphertext {
    fn from(extended: ExtendedCiphertext) -> Self {
        extended.inner
    }
}

/// Lookup table for discrete logarithms.
///
/// Exponential ElGamal decrypts to `g^v` rather than `v`. Recovering `v` is only feasible
/// when `v` is known to be small; this table maps `g^i mod p` to `i` for all `i` in
/// `0..=max_value`. The table must cover the largest value that can legitimately be
/// decrypted (e.g., the number of votes in a section); values outside the table yield `None`.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{group::GroupParams, DiscreteLogTable, Keypair};
/// # use rand::thread_rng;
/// let params = GroupParams::rfc3526_2048();
/// let keypair = Keypair::generate(&params, &mut thread_rng());
/// let table = DiscreteLogTable::new(&params, 10);
/// let ciphertext = keypair.public().encrypt(7, &mut thread_rng());
/// assert_eq!(keypair.secret().decrypt(&ciphertext, &table), Some(7));
///
/// let ciphertext = keypair.public().encrypt(11, &mut thread_rng());
/// assert_eq!(keypair.secret().decrypt(&ciphertext, &table), None);
/// ```
#[derive(Debug, Clone)]
pub struct DiscreteLogTable {
    inner: HashMap<BigUint, u64>,
    max_value: u64,
}

impl DiscreteLogTable {
    /// Creates a lookup table for values in `0..=max_value` by repeated multiplication
    /// by the generator.
    pub fn new(params: &GroupParams, max_value: u64) -> Self {
        let mut inner = HashMap::new();
        let mut element = BigUint::one();
        for value in 0..=max_value {
            // Values beyond the subgroup order wrap around; keep the smallest logarithm.
            inner.entry(element.clone()).or_insert(value);
            element = params.mul(&element, params.generator());
        }
        Self { inner, max_value }
    }

    /// Returns the largest value covered by this table.
    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Gets the discrete log of `decrypted_element`, or `None` if it is not present
    /// in this table.
    pub fn get(&self, decrypted_element: &BigUint) -> Option<u64> {
        self.inner.get(decrypted_element).copied()
    }
}
