//! Safe-prime groups in which the discrete log problem is believed to be hard.
//!
//! All cryptographic operations in this crate take place in the subgroup of quadratic
//! residues modulo a safe prime `p = 2q + 1`. This subgroup has prime order `q`.
//! Its elements are represented as integers in `[1, p)`, and exponents (scalars)
//! are integers modulo `q`.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand_chacha::ChaChaRng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;

use std::fmt;

mod primes;

use self::primes::{find_safe_prime, is_probable_prime, SafePrimeSearch, MILLER_RABIN_ROUNDS};
use crate::serde::DecimalHelper;

/// Fixed-width big-endian encoding of a group element or scalar. Inline capacity covers
/// 4096-bit groups.
pub(crate) type ElementBytes = SmallVec<[u8; 512]>;

/// Maximum number of hash outputs tried when deriving the subgroup generator.
const MAX_GENERATOR_ATTEMPTS: u32 = 256;

const GENERATOR_DOMAIN: &[u8] = b"evote-elgamal/subgroup-generator";

/// Safe prime from the 2048-bit MODP group (RFC 3526, group 14).
const RFC3526_2048_MODULUS: [u8; 256] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2, 0x34,
    0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74,
    0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d, 0xf2, 0x5f, 0x14, 0x37,
    0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6,
    0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11, 0x7c, 0x4b, 0x1f, 0xe6,
    0x49, 0x28, 0x66, 0x51, 0xec, 0xe4, 0x5b, 0x3d, 0xc2, 0x00, 0x7c, 0xb8, 0xa1, 0x63, 0xbf, 0x05,
    0x98, 0xda, 0x48, 0x36, 0x1c, 0x55, 0xd3, 0x9a, 0x69, 0x16, 0x3f, 0xa8, 0xfd, 0x24, 0xcf, 0x5f,
    0x83, 0x65, 0x5d, 0x23, 0xdc, 0xa3, 0xad, 0x96, 0x1c, 0x62, 0xf3, 0x56, 0x20, 0x85, 0x52, 0xbb,
    0x9e, 0xd5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6d, 0x67, 0x0c, 0x35, 0x4e, 0x4a, 0xbc, 0x98, 0x04,
    0xf1, 0x74, 0x6c, 0x08, 0xca, 0x18, 0x21, 0x7c, 0x32, 0x90, 0x5e, 0x46, 0x2e, 0x36, 0xce, 0x3b,
    0xe3, 0x9e, 0x77, 0x2c, 0x18, 0x0e, 0x86, 0x03, 0x9b, 0x27, 0x83, 0xa2, 0xec, 0x07, 0xa2, 0x8f,
    0xb5, 0xc5, 0x5d, 0xf0, 0x6f, 0x4c, 0x52, 0xc9, 0xde, 0x2b, 0xcb, 0xf6, 0x95, 0x58, 0x17, 0x18,
    0x39, 0x95, 0x49, 0x7c, 0xea, 0x95, 0x6a, 0xe5, 0x15, 0xd2, 0x26, 0x18, 0x98, 0xfa, 0x05, 0x10,
    0x15, 0x72, 0x8e, 0x5a, 0x8a, 0xac, 0xaa, 0x68, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Error generating group parameters.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// Requested bit length is too small to produce a usable group.
    #[error(
        "bit length {0} is below the supported minimum of {}",
        GroupParams::MIN_BIT_LENGTH
    )]
    BitLengthTooSmall(u64),
    /// Safe-prime search hit the configured bound on sampled candidates.
    #[error("no safe prime found among {0} sampled candidates")]
    SafePrimeSearchExhausted(u64),
    /// No generator of the order-`q` subgroup could be derived.
    #[error("cannot derive a generator of the prime-order subgroup")]
    GeneratorNotFound,
}

/// Error validating externally supplied group parameters.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParamsError {
    /// Modulus is shorter than [`GroupParams::MIN_BIT_LENGTH`].
    #[error("modulus has {0} bits, which is below the supported minimum")]
    TooSmall(u64),
    /// `p != 2q + 1`.
    #[error("modulus is not equal to 2 * subgroup order + 1")]
    NotSafePrimePair,
    /// `p` or `q` failed the probabilistic primality test.
    #[error("{0} is not a prime")]
    NotPrime(&'static str),
    /// Generator is outside `(1, p)` or does not have order `q`.
    #[error("generator does not generate the subgroup of order q")]
    InvalidGenerator,
    /// Generator derivation failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Parameters of a prime-order subgroup modulo a safe prime: the modulus `p`, the subgroup
/// order `q = (p - 1) / 2` and the subgroup generator `g`.
///
/// Parameters are immutable once constructed. The validating constructors guarantee that
/// `p = 2q + 1`, `1 < g < p` and `g^q ≡ 1 (mod p)`; probabilistic primality of `p` and `q`
/// is checked by [`Self::generate()`] and [`Self::from_safe_prime()`], and on demand
/// by [`Self::verify_primes()`].
///
/// # Serialization
///
/// Parameters are serialized as `{ "primeP", "primeQ", "generator" }` with integers encoded
/// as decimal strings. Deserialization validates structural invariants, but does not
/// test primality.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GroupParamsRepr", into = "GroupParamsRepr")]
pub struct GroupParams {
    modulus: BigUint,
    order: BigUint,
    generator: BigUint,
    element_len: usize,
}

impl fmt::Debug for GroupParams {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GroupParams")
            .field("bits", &self.modulus.bits())
            .field("modulus", &format_args!("{:x}", self.modulus))
            .field("generator", &format_args!("{}", self.generator))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupParamsRepr {
    #[serde(with = "DecimalHelper")]
    prime_p: BigUint,
    #[serde(with = "DecimalHelper")]
    prime_q: BigUint,
    #[serde(with = "DecimalHelper")]
    generator: BigUint,
}

impl TryFrom<GroupParamsRepr> for GroupParams {
    type Error = ParamsError;

    fn try_from(repr: GroupParamsRepr) -> Result<Self, Self::Error> {
        Self::new(repr.prime_p, repr.prime_q, repr.generator)
    }
}

impl From<GroupParams> for GroupParamsRepr {
    fn from(params: GroupParams) -> Self {
        Self {
            prime_p: params.modulus,
            prime_q: params.order,
            generator: params.generator,
        }
    }
}

impl GroupParams {
    /// Minimum supported bit length of the modulus.
    pub const MIN_BIT_LENGTH: u64 = 16;

    /// Creates parameters from their components, checking structural invariants.
    /// Primality of `modulus` and `order` is **not** checked; use [`Self::verify_primes()`]
    /// for untrusted inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if `modulus != 2 * order + 1`, if the modulus is too small,
    /// or if `generator` does not generate the subgroup of order `order`.
    pub fn new(modulus: BigUint, order: BigUint, generator: BigUint) -> Result<Self, ParamsError> {
        let bits = modulus.bits();
        if bits < Self::MIN_BIT_LENGTH {
            return Err(ParamsError::TooSmall(bits));
        }
        if modulus != (&order << 1_u32) + 1_u32 {
            return Err(ParamsError::NotSafePrimePair);
        }
        if generator <= BigUint::one()
            || generator >= modulus
            || !generator.modpow(&order, &modulus).is_one()
        {
            return Err(ParamsError::InvalidGenerator);
        }
        Ok(Self::from_parts_unchecked(modulus, order, generator))
    }

    fn from_parts_unchecked(modulus: BigUint, order: BigUint, generator: BigUint) -> Self {
        #[allow(clippy::cast_possible_truncation)] // bit lengths of in-memory integers fit
        let element_len = ((modulus.bits() + 7) / 8) as usize;
        Self {
            modulus,
            order,
            generator,
            element_len,
        }
    }

    /// Validates a safe prime `modulus` and derives the subgroup generator from it
    /// deterministically (see [`Self::generate()`]).
    ///
    /// # Errors
    ///
    /// Returns an error if `modulus` or `(modulus - 1) / 2` is not a prime, or if
    /// the modulus is too small.
    pub fn from_safe_prime(modulus: BigUint) -> Result<Self, ParamsError> {
        let bits = modulus.bits();
        if bits < Self::MIN_BIT_LENGTH {
            return Err(ParamsError::TooSmall(bits));
        }
        let order = &modulus >> 1_u32;
        let generator = derive_generator(&modulus, &order)?;
        let params = Self::from_parts_unchecked(modulus, order, generator);
        params.verify_primes()?;
        Ok(params)
    }

    /// Returns the 2048-bit MODP group from RFC 3526 (group 14) with generator 2.
    /// Since this modulus is `7 (mod 8)`, 2 is a quadratic residue and thus generates
    /// the subgroup of prime order `q`.
    pub fn rfc3526_2048() -> Self {
        let modulus = BigUint::from_bytes_be(&RFC3526_2048_MODULUS);
        let order = &modulus >> 1_u32;
        Self::from_parts_unchecked(modulus, order, BigUint::from(2_u32))
    }

    /// Generates new parameters with a `bit_length`-bit safe prime modulus.
    ///
    /// The search samples random `bit_length`-bit integers `p` until both `p` and
    /// `q = (p - 1) / 2` are probable primes; there is no bound on the number of candidates.
    /// The generator is derived deterministically from `p` and `q`: it is the square modulo `p`
    /// of `SHA-256(domain || p || q || counter)` for the first counter yielding a square
    /// distinct from 0 and 1. In a safe-prime group, every such square has order `q`.
    ///
    /// # Errors
    ///
    /// Returns an error if `bit_length` is less than [`Self::MIN_BIT_LENGTH`] or if
    /// the generator cannot be derived.
    pub fn generate<R: CryptoRng + RngCore>(
        bit_length: u64,
        rng: &mut R,
    ) -> Result<Self, GenerationError> {
        Self::generate_with_limit(bit_length, None, rng)
    }

    /// Same as [`Self::generate()`], but stops the safe-prime search after
    /// `max_candidates` sampled candidates, if specified.
    ///
    /// # Errors
    ///
    /// Additionally to [`Self::generate()`] errors, returns
    /// [`GenerationError::SafePrimeSearchExhausted`] if no safe prime is found in time.
    #[tracing::instrument(level = "debug", skip(rng), err)]
    pub fn generate_with_limit<R: CryptoRng + RngCore>(
        bit_length: u64,
        max_candidates: Option<u64>,
        rng: &mut R,
    ) -> Result<Self, GenerationError> {
        if bit_length < Self::MIN_BIT_LENGTH {
            return Err(GenerationError::BitLengthTooSmall(bit_length));
        }

        let (modulus, candidates) = match find_safe_prime(bit_length, max_candidates, rng) {
            SafePrimeSearch::Found {
                modulus,
                candidates,
            } => (modulus, candidates),
            SafePrimeSearch::Exhausted => {
                let candidates = max_candidates.unwrap_or_default();
                return Err(GenerationError::SafePrimeSearchExhausted(candidates));
            }
        };
        tracing::debug!(bit_length, candidates, "found safe prime");

        let order = &modulus >> 1_u32;
        let generator = derive_generator(&modulus, &order)?;
        Ok(Self::from_parts_unchecked(modulus, order, generator))
    }

    /// Checks that the modulus and subgroup order are probable primes. Miller–Rabin
    /// witnesses are derived deterministically from the modulus.
    ///
    /// # Errors
    ///
    /// Returns an error naming the component that is not prime.
    pub fn verify_primes(&self) -> Result<(), ParamsError> {
        let seed: [u8; 32] = Sha256::new()
            .chain_update(b"evote-elgamal/primality")
            .chain_update(self.modulus.to_bytes_be())
            .finalize()
            .into();
        let mut rng = ChaChaRng::from_seed(seed);
        if !is_probable_prime(&self.order, MILLER_RABIN_ROUNDS, &mut rng) {
            return Err(ParamsError::NotPrime("q"));
        }
        if !is_probable_prime(&self.modulus, MILLER_RABIN_ROUNDS, &mut rng) {
            return Err(ParamsError::NotPrime("p"));
        }
        Ok(())
    }

    /// Returns the safe prime modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Returns the subgroup order `q`.
    pub fn order(&self) -> &BigUint {
        &self.order
    }

    /// Returns the subgroup generator `g`.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Returns the bit length of the modulus.
    pub fn bit_length(&self) -> u64 {
        self.modulus.bits()
    }

    /// Byte length of the fixed-width element encoding.
    pub(crate) fn element_len(&self) -> usize {
        self.element_len
    }

    /// Checks whether `value` is in `[1, p)`, i.e., is a valid non-zero residue.
    pub fn is_residue(&self, value: &BigUint) -> bool {
        !value.is_zero() && *value < self.modulus
    }

    /// Checks whether `value` is an element of the prime-order subgroup.
    /// This involves a modular exponentiation.
    pub fn is_subgroup_element(&self, value: &BigUint) -> bool {
        self.is_residue(value) && value.modpow(&self.order, &self.modulus).is_one()
    }

    /// Checks whether `value` is a reduced scalar, i.e., lies in `[0, q)`.
    pub fn is_scalar(&self, value: &BigUint) -> bool {
        *value < self.order
    }

    /// Exponential encoding of a small value: `g^value mod p`.
    pub fn encode(&self, value: u64) -> BigUint {
        self.pow_generator(&BigUint::from(value))
    }

    pub(crate) fn pow_generator(&self, exponent: &BigUint) -> BigUint {
        self.generator.modpow(exponent, &self.modulus)
    }

    pub(crate) fn pow(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.modpow(exponent, &self.modulus)
    }

    pub(crate) fn mul(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        lhs * rhs % &self.modulus
    }

    /// Multiplicative inverse modulo `p` via Fermat's little theorem. `value` must be
    /// a non-zero residue; zero maps to zero.
    pub(crate) fn invert(&self, value: &BigUint) -> BigUint {
        let exponent = &self.modulus - 2_u32;
        value.modpow(&exponent, &self.modulus)
    }

    /// Computes `lhs / rhs mod p`.
    pub(crate) fn div(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        self.mul(lhs, &self.invert(rhs))
    }

    pub(crate) fn reduce_scalar(&self, value: &BigUint) -> BigUint {
        value % &self.order
    }

    pub(crate) fn add_scalars(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        (lhs + rhs) % &self.order
    }

    pub(crate) fn sub_scalars(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        let rhs = rhs % &self.order;
        (lhs + &self.order - rhs) % &self.order
    }

    pub(crate) fn mul_scalars(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        lhs * rhs % &self.order
    }

    /// Samples a uniformly random scalar in `[1, q)`.
    pub fn random_scalar<R: CryptoRng + RngCore>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_range(&BigUint::one(), &self.order)
    }

    /// Samples a uniformly random residue in `[1, p)`. This is the range used for encryption
    /// randomness.
    pub fn random_residue<R: CryptoRng + RngCore>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_range(&BigUint::one(), &self.modulus)
    }

    /// Derives a scalar in `[0, q)` from a 32-byte seed (e.g., produced by a transcript).
    pub(crate) fn scalar_from_seed(&self, seed: [u8; 32]) -> BigUint {
        let mut rng = ChaChaRng::from_seed(seed);
        rng.gen_biguint_below(&self.order)
    }

    /// Fixed-width big-endian encoding of `value`, which must be less than `p`.
    pub(crate) fn element_bytes(&self, value: &BigUint) -> ElementBytes {
        let bytes = value.to_bytes_be();
        let mut output = ElementBytes::from_elem(0, self.element_len);
        let offset = self.element_len.saturating_sub(bytes.len());
        let tail = bytes.len().min(self.element_len);
        output[offset..].copy_from_slice(&bytes[bytes.len() - tail..]);
        output
    }
}

fn derive_generator(modulus: &BigUint, order: &BigUint) -> Result<BigUint, GenerationError> {
    let modulus_bytes = modulus.to_bytes_be();
    let order_bytes = order.to_bytes_be();
    let two = BigUint::from(2_u32);

    for counter in 0..MAX_GENERATOR_ATTEMPTS {
        let digest = Sha256::new()
            .chain_update(GENERATOR_DOMAIN)
            .chain_update(&modulus_bytes)
            .chain_update(&order_bytes)
            .chain_update(counter.to_be_bytes())
            .finalize();
        let seed = BigUint::from_bytes_be(&digest) % modulus;
        let candidate = seed.modpow(&two, modulus);
        if candidate > BigUint::one() {
            return Ok(candidate);
        }
    }
    Err(GenerationError::GeneratorNotFound)
}
