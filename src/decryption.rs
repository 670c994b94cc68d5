//! Verifiable decryption.

use merlin::Transcript;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    group::GroupParams,
    proofs::{LogEqualityProof, TranscriptForGroup},
    serde::DecimalHelper,
    Ciphertext, DiscreteLogTable, PublicKey, SecretKey, VerificationError,
};

/// Verifiable decryption for a certain [`Ciphertext`] in the ElGamal encryption scheme.
///
/// # Construction
///
/// Decryption is represented by a single group element, the result of combining
/// the [`SecretKey`] exponent `x` with the random element of the ciphertext `alpha`
/// (i.e., `D = alpha^x`, the Diffie–Hellman construction). The plaintext element is then
/// `beta / D`.
///
/// The decryption can be proven with the help of a standard [`LogEqualityProof`]. Indeed,
/// to prove the validity of decryption, it is sufficient to prove `dlog_alpha(D) = dlog_g(h)`,
/// where `g` is the group generator and `h = g^x` is the public key for encryption.
/// Equivalently, the proof shows that `dlog_g(h) = dlog_alpha(beta / m)` for the plaintext `m`.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{
/// #     group::GroupParams, CandidateDecryption, VerifiableDecryption, Keypair, DiscreteLogTable,
/// # };
/// # use merlin::Transcript;
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GroupParams::rfc3526_2048();
/// let mut rng = thread_rng();
/// let keys = Keypair::generate(&params, &mut rng);
/// // Suppose the `keys` holder wants to prove decryption
/// // of the following ciphertext:
/// let ciphertext = keys.public().encrypt(42, &mut rng);
/// let (decryption, proof) = VerifiableDecryption::new(
///     &ciphertext,
///     keys.secret(),
///     &mut Transcript::new(b"decryption"),
///     &mut rng,
/// );
///
/// // This proof can then be universally verified:
/// let candidate_decryption = CandidateDecryption::from(decryption);
/// let decryption = candidate_decryption.verify(
///     &ciphertext,
///     keys.public(),
///     &proof,
///     &mut Transcript::new(b"decryption"),
/// )?;
/// let table = DiscreteLogTable::new(&params, 50);
/// assert_eq!(decryption.decrypt(&ciphertext, &params, &table), Some(42));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableDecryption {
    #[serde(with = "DecimalHelper")]
    dh_element: BigUint,
}

impl VerifiableDecryption {
    /// Creates a decryption for the specified `ciphertext` under `secret` together with
    /// a zero-knowledge proof of validity.
    ///
    /// See [`CandidateDecryption::verify()`] for the verification counterpart.
    pub fn new<R: CryptoRng + RngCore>(
        ciphertext: &Ciphertext,
        secret: &SecretKey,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> (Self, LogEqualityProof) {
        let params = secret.params();
        // All inputs except from `ciphertext.beta` are committed in the `proof`.
        transcript.start_proof(b"decryption");

        let exponent = params.reduce_scalar(secret.expose_exponent());
        let dh_element = params.pow(&ciphertext.alpha, &exponent);
        let proof = LogEqualityProof::new(
            params,
            (params.generator(), &ciphertext.alpha),
            (secret.public().as_element(), &dh_element),
            &exponent,
            transcript,
            rng,
        );

        (Self { dh_element }, proof)
    }

    /// Returns the group element encapsulated in this decryption.
    pub fn as_element(&self) -> &BigUint {
        &self.dh_element
    }

    /// Decrypts the provided ciphertext and returns the produced group element.
    ///
    /// As the ciphertext does not include a MAC or another way to assert integrity,
    /// this operation cannot fail. If the ciphertext is not produced properly (e.g., it targets
    /// another receiver), the returned group element will be garbage.
    pub fn decrypt_to_element(&self, ciphertext: &Ciphertext, params: &GroupParams) -> BigUint {
        params.div(&ciphertext.beta, &self.dh_element)
    }

    /// Decrypts the provided ciphertext and returns the original encrypted value.
    ///
    /// `lookup_table` is used to find encrypted values based on the original decrypted
    /// group element. That is, it must contain all valid plaintext values. If the value
    /// is not in the table, this method will return `None`.
    pub fn decrypt(
        &self,
        ciphertext: &Ciphertext,
        params: &GroupParams,
        lookup_table: &DiscreteLogTable,
    ) -> Option<u64> {
        lookup_table.get(&self.decrypt_to_element(ciphertext, params))
    }
}

/// Candidate for a [`VerifiableDecryption`] that is not yet verified. This presentation should be
/// used for decryption data retrieved from an untrusted source.
///
/// # Examples
///
/// See [`VerifiableDecryption`] for an example of usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateDecryption {
    inner: VerifiableDecryption,
}

impl CandidateDecryption {
    pub(crate) fn from_element(dh_element: BigUint) -> Self {
        Self {
            inner: VerifiableDecryption { dh_element },
        }
    }

    /// Verifies this as decryption for `ciphertext` under `key` using the provided
    /// zero-knowledge `proof`.
    ///
    /// # Errors
    ///
    /// Returns an error if `proof` does not verify.
    pub fn verify(
        self,
        ciphertext: &Ciphertext,
        key: &PublicKey,
        proof: &LogEqualityProof,
        transcript: &mut Transcript,
    ) -> Result<VerifiableDecryption, VerificationError> {
        let params = key.params();
        if !params.is_residue(&ciphertext.alpha) {
            return Err(VerificationError::OutOfRange("ciphertext"));
        }
        transcript.start_proof(b"decryption");
        proof.verify(
            params,
            (params.generator(), &ciphertext.alpha),
            (key.as_element(), &self.inner.dh_element),
            transcript,
        )?;
        Ok(self.inner)
    }

    /// Converts this candidate decryption into a [`VerifiableDecryption`]
    /// **without** verifying it.
    /// This is only semantically correct if the data was verified in some other way.
    pub fn into_unchecked(self) -> VerifiableDecryption {
        self.inner
    }
}

impl From<VerifiableDecryption> for CandidateDecryption {
    fn from(decryption: VerifiableDecryption) -> Self {
        Self { inner: decryption }
    }
}
