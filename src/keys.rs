//! Cryptographic keys for exponential ElGamal encryption.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use serde::{
    de::Error as DeError, ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer,
};
use zeroize::Zeroizing;

use std::{fmt, sync::atomic};

use crate::{
    group::{GenerationError, GroupParams, ParamsError},
    serde::DecimalHelper,
};

mod impls;

/// Error constructing or validating keys.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// Public value is not an element of the prime-order subgroup, or is the identity.
    #[error("public value is not a non-trivial element of the prime-order subgroup")]
    InvalidPublicValue,
    /// Secret exponent is outside `[1, p)`.
    #[error("secret exponent is outside the admissible range")]
    ExponentOutOfRange,
    /// Public value does not equal `g^x` for the secret exponent `x`.
    #[error("public value does not match the secret exponent")]
    KeyMismatch,
    /// Public and secret keys are defined over different groups.
    #[error("public and secret keys belong to different groups")]
    GroupMismatch,
    /// `p - 1` is not divisible by `q`.
    #[error("subgroup order does not divide p - 1")]
    OrderMismatch,
    /// Group parameters are invalid.
    #[error(transparent)]
    Params(#[from] ParamsError),
}

/// Range from which secret exponents are sampled.
///
/// Both ranges yield keys that encrypt and decrypt correctly, since the generator has order `q`
/// and decryption reduces the exponent modulo `q`. Sampling from `[1, p)` is, however,
/// slightly biased modulo `q`: residues `1` and `2..q` are hit with different frequencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretExponentRange {
    /// Uniform sampling from `[1, q)`.
    #[default]
    SubgroupOrder,
    /// Uniform sampling from `[1, p)`.
    Modulus,
}

impl SecretExponentRange {
    fn sample<R: CryptoRng + RngCore>(self, params: &GroupParams, rng: &mut R) -> BigUint {
        match self {
            Self::SubgroupOrder => params.random_scalar(rng),
            Self::Modulus => params.random_residue(rng),
        }
    }

    /// Checks whether `exponent` lies in this range.
    pub fn contains(self, params: &GroupParams, exponent: &BigUint) -> bool {
        let upper_bound = match self {
            Self::SubgroupOrder => params.order(),
            Self::Modulus => params.modulus(),
        };
        !exponent.is_zero() && exponent < upper_bound
    }
}

/// Public key for ElGamal encryption: the group parameters together with `h = g^x mod p`.
///
/// # Serialization
///
/// Public keys are serialized as `{ "pubKey", "primeP", "primeQ", "generator" }`, with
/// integers encoded as decimal strings. This is the only key material that should leave
/// the election authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRepr", into = "PublicKeyRepr")]
pub struct PublicKey {
    params: GroupParams,
    element: BigUint,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("PublicKey")
            .field(&format_args!("{:x}", self.element))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyRepr {
    #[serde(with = "DecimalHelper")]
    pub_key: BigUint,
    #[serde(flatten)]
    params: GroupParams,
}

impl TryFrom<PublicKeyRepr> for PublicKey {
    type Error = KeyError;

    fn try_from(repr: PublicKeyRepr) -> Result<Self, Self::Error> {
        Self::new(repr.params, repr.pub_key)
    }
}

impl From<PublicKey> for PublicKeyRepr {
    fn from(key: PublicKey) -> Self {
        Self {
            pub_key: key.element,
            params: key.params,
        }
    }
}

impl PublicKey {
    /// Creates a public key from the group parameters and the public value.
    ///
    /// # Errors
    ///
    /// Returns an error if `element` is not a non-identity element of the prime-order subgroup.
    pub fn new(params: GroupParams, element: BigUint) -> Result<Self, KeyError> {
        if element.is_one() || !params.is_subgroup_element(&element) {
            return Err(KeyError::InvalidPublicValue);
        }
        Ok(Self { params, element })
    }

    /// Returns the group parameters this key is defined over.
    pub fn params(&self) -> &GroupParams {
        &self.params
    }

    /// Returns the public value `h = g^x mod p`.
    pub fn as_element(&self) -> &BigUint {
        &self.element
    }
}

/// Secret key for ElGamal encryption: the [`PublicKey`] together with the secret exponent `x`.
///
/// The exponent is never printed by the `Debug` implementation. It is serialized
/// (as the `privKey` field alongside the public key fields) only to support persisting
/// key material inside the election authority. The exponent digits are overwritten when
/// the key is dropped; this is best-effort since temporaries produced by big-integer
/// arithmetic are not tracked.
#[derive(Clone)]
pub struct SecretKey {
    public: PublicKey,
    exponent: BigUint,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SecretKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl SecretKey {
    /// Creates a secret key from the secret exponent, computing the public value.
    ///
    /// # Errors
    ///
    /// Returns an error if `exponent` is outside `[1, p)`, or if it is a multiple of `q`
    /// (in which case the public value would be the identity).
    pub fn new(params: GroupParams, exponent: BigUint) -> Result<Self, KeyError> {
        if !SecretExponentRange::Modulus.contains(&params, &exponent) {
            return Err(KeyError::ExponentOutOfRange);
        }
        let element = params.pow_generator(&exponent);
        let public = PublicKey::new(params, element)?;
        Ok(Self { public, exponent })
    }

    /// Generates a random secret key with the exponent sampled from `range`.
    pub fn generate<R: CryptoRng + RngCore>(
        params: &GroupParams,
        range: SecretExponentRange,
        rng: &mut R,
    ) -> Self {
        loop {
            let exponent = range.sample(params, rng);
            // Exponents from `[1, p)` may be divisible by `q`; such keys are unusable.
            if exponent.is_multiple_of(params.order()) {
                continue;
            }
            let element = params.pow_generator(&exponent);
            let public = PublicKey {
                params: params.clone(),
                element,
            };
            return Self { public, exponent };
        }
    }

    /// Deserializes a secret exponent from its big-endian byte representation.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::new()`].
    pub fn from_bytes(params: GroupParams, bytes: &[u8]) -> Result<Self, KeyError> {
        Self::new(params, BigUint::from_bytes_be(bytes))
    }

    /// Serializes the secret exponent into fixed-width big-endian bytes. The returned buffer
    /// is zeroed on drop.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.public.params.element_bytes(&self.exponent).to_vec())
    }

    /// Returns the public key corresponding to this secret key.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the group parameters of this key.
    pub fn params(&self) -> &GroupParams {
        &self.public.params
    }

    /// Exposes the secret exponent `x`.
    pub fn expose_exponent(&self) -> &BigUint {
        &self.exponent
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        wipe(&mut self.exponent);
    }
}

/// Overwrites the digits of `value` in place and resets it to zero.
fn wipe(value: &mut BigUint) {
    let digit_count = usize::try_from((value.bits() + 31) / 32).unwrap_or(0);
    // Digits are rewritten within the existing allocation.
    value.assign_from_slice(&vec![u32::MAX; digit_count]);
    atomic::compiler_fence(atomic::Ordering::SeqCst);
    value.set_zero();
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let params = &self.public.params;
        let exponent = Zeroizing::new(self.exponent.to_string());
        let mut state = serializer.serialize_struct("SecretKey", 5)?;
        state.serialize_field("privKey", exponent.as_str())?;
        state.serialize_field("pubKey", &self.public.element.to_string())?;
        state.serialize_field("primeP", &params.modulus().to_string())?;
        state.serialize_field("primeQ", &params.order().to_string())?;
        state.serialize_field("generator", &params.generator().to_string())?;
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretKeyRepr {
    #[serde(with = "DecimalHelper")]
    priv_key: BigUint,
    #[serde(flatten)]
    public: PublicKey,
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = SecretKeyRepr::deserialize(deserializer)?;
        let secret = Self::new(repr.public.params.clone(), repr.priv_key).map_err(D::Error::custom)?;
        if secret.public != repr.public {
            return Err(D::Error::custom(KeyError::KeyMismatch));
        }
        Ok(secret)
    }
}

/// Keypair for ElGamal encryption, consisting of a [`SecretKey`] and the matching [`PublicKey`]
/// defined over the same group.
///
/// Serialized the same way as the [`SecretKey`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keypair {
    secret: SecretKey,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Keypair")
            .field("public", self.public())
            .finish()
    }
}

impl Keypair {
    /// Generates a random keypair over `params` with the exponent sampled from `[1, q)`.
    pub fn generate<R: CryptoRng + RngCore>(params: &GroupParams, rng: &mut R) -> Self {
        Self::generate_with_range(params, SecretExponentRange::default(), rng)
    }

    /// Generates a random keypair over `params` with the exponent sampled from `range`.
    pub fn generate_with_range<R: CryptoRng + RngCore>(
        params: &GroupParams,
        range: SecretExponentRange,
        rng: &mut R,
    ) -> Self {
        Self {
            secret: SecretKey::generate(params, range, rng),
        }
    }

    /// Generates a new `bit_length`-bit safe-prime group and a keypair over it.
    ///
    /// # Errors
    ///
    /// Propagates group generation errors.
    pub fn generate_with_new_group<R: CryptoRng + RngCore>(
        bit_length: u64,
        range: SecretExponentRange,
        rng: &mut R,
    ) -> Result<Self, GenerationError> {
        let params = GroupParams::generate(bit_length, rng)?;
        Ok(Self::generate_with_range(&params, range, rng))
    }

    /// Assembles a keypair from its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys are defined over different groups, if `q` does not
    /// divide `p - 1`, or if the public value does not match the secret exponent.
    pub fn from_parts(public: PublicKey, secret: SecretKey) -> Result<Self, KeyError> {
        if public.params != secret.public.params {
            return Err(KeyError::GroupMismatch);
        }
        let params = &public.params;
        let modulus_minus_one = params.modulus() - 1_u32;
        if !modulus_minus_one.is_multiple_of(params.order()) {
            return Err(KeyError::OrderMismatch);
        }
        if params.pow_generator(&secret.exponent) != public.element {
            return Err(KeyError::KeyMismatch);
        }
        Ok(Self { secret })
    }

    /// Returns the public part of this keypair.
    pub fn public(&self) -> &PublicKey {
        &self.secret.public
    }

    /// Returns the secret part of this keypair.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Returns public and secret keys comprising this keypair.
    pub fn into_tuple(self) -> (PublicKey, SecretKey) {
        (self.secret.public.clone(), self.secret)
    }
}

impl From<SecretKey> for Keypair {
    fn from(secret: SecretKey) -> Self {
        Self { secret }
    }
}
