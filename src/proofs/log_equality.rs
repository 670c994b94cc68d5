//! [`LogEqualityProof`] and related logic.

use merlin::Transcript;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{
    group::GroupParams,
    proofs::{scalars_eq, TranscriptForGroup, VerificationError},
    serde::DecimalHelper,
};

/// Zero-knowledge proof of equality of two discrete logarithms in different bases,
/// aka Chaum–Pedersen protocol.
///
/// # Construction
///
/// This proof is a result of the [Fiat–Shamir transform][fst] applied to a standard
/// ZKP of equality of the two discrete logs in different bases.
///
/// - Public parameters of the proof are the two bases `G` and `K` in the prime-order subgroup
///   modulo a safe prime.
/// - Prover and verifier both know group elements `R` and `B`, which presumably have
///   the same discrete log in bases `G` and `K` respectively.
/// - Prover additionally knows the discrete log in question: `r = dlog_G(R) = dlog_K(B)`.
///
/// The interactive proof is specified as a sigma protocol as follows:
///
/// 1. **Commitment:** The prover generates random scalar `x`. The prover sends to the verifier
///   `X_G = G^x` and `X_K = K^x`.
/// 2. **Challenge:** The verifier sends to the prover random scalar `c`.
/// 3. **Response:** The prover computes scalar `s = x + cr mod q` and sends it to the verifier.
///
/// Verification equations are:
///
/// ```text
/// G^s ?= X_G * R^c;
/// K^s ?= X_K * B^c.
/// ```
///
/// In the non-interactive version of the proof, challenge `c` is derived from the [`Transcript`]
/// that absorbs the group, both bases, both powers and both commitments.
///
/// Unlike compressed `(c, s)` encodings, the proof retains both commitments, so that it can be
/// used as a branch of a [`DisjunctiveProof`](crate::DisjunctiveProof) where the challenge is
/// not derived per branch.
///
/// # Serialization
///
/// The proof is serialized as `{ "commitment1", "commitment2", "challenge", "response" }`
/// with decimal string values.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{group::GroupParams, Keypair, LogEqualityProof};
/// # use merlin::Transcript;
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GroupParams::rfc3526_2048();
/// let mut rng = thread_rng();
/// let (log_base, _) = Keypair::generate(&params, &mut rng).into_tuple();
/// let (power_g, discrete_log) = Keypair::generate(&params, &mut rng).into_tuple();
/// let power_k = log_base.as_element().modpow(discrete_log.expose_exponent(), params.modulus());
///
/// let bases = (params.generator(), log_base.as_element());
/// let powers = (power_g.as_element(), &power_k);
/// let proof = LogEqualityProof::new(
///     &params,
///     bases,
///     powers,
///     discrete_log.expose_exponent(),
///     &mut Transcript::new(b"custom_proof"),
///     &mut rng,
/// );
/// proof.verify(&params, bases, powers, &mut Transcript::new(b"custom_proof"))?;
/// # Ok(())
/// # }
/// ```
///
/// [fst]: https://en.wikipedia.org/wiki/Fiat%E2%80%93Shamir_heuristic
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEqualityProof {
    #[serde(rename = "commitment1", with = "DecimalHelper")]
    first_commitment: BigUint,
    #[serde(rename = "commitment2", with = "DecimalHelper")]
    second_commitment: BigUint,
    #[serde(with = "DecimalHelper")]
    challenge: BigUint,
    #[serde(with = "DecimalHelper")]
    response: BigUint,
}

impl fmt::Debug for LogEqualityProof {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LogEqualityProof")
            .field("commitment1", &format_args!("{:x}", self.first_commitment))
            .field("commitment2", &format_args!("{:x}", self.second_commitment))
            .field("challenge", &format_args!("{:x}", self.challenge))
            .field("response", &format_args!("{:x}", self.response))
            .finish()
    }
}

impl LogEqualityProof {
    /// Creates a new proof.
    ///
    /// # Parameters
    ///
    /// - `bases` are `G` and `K` in the notation above. Both must be elements
    ///   of the prime-order subgroup.
    /// - `powers` are `G^r` and `K^r`, respectively. It is **not** checked whether `r`
    ///   is a discrete log of these powers; if this is not the case, the constructed proof
    ///   will not [`verify`](Self::verify()).
    /// - `secret` is the discrete log (`r` in the notation above). It does not need
    ///   to be reduced modulo `q`.
    pub fn new<R: CryptoRng + RngCore>(
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        powers: (&BigUint, &BigUint),
        secret: &BigUint,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Self {
        let nonce = params.random_scalar(rng);
        let (first_commitment, second_commitment) = Self::commit(params, bases, &nonce);
        Self::append_statement(transcript, params, bases, powers);
        transcript.append_element(b"[x]G", params, &first_commitment);
        transcript.append_element(b"[x]K", params, &second_commitment);
        let challenge = transcript.challenge_scalar(b"c", params);
        let response = Self::respond(params, &nonce, secret, &challenge);

        Self {
            first_commitment,
            second_commitment,
            challenge,
            response,
        }
    }

    fn append_statement(
        transcript: &mut Transcript,
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        powers: (&BigUint, &BigUint),
    ) {
        transcript.start_proof(b"log_eq");
        transcript.append_group(params);
        transcript.append_element(b"G", params, bases.0);
        transcript.append_element(b"K", params, bases.1);
        transcript.append_element(b"[r]G", params, powers.0);
        transcript.append_element(b"[r]K", params, powers.1);
    }

    /// Creates a proof from its components without any checks.
    pub fn from_parts(
        commitments: (BigUint, BigUint),
        challenge: BigUint,
        response: BigUint,
    ) -> Self {
        Self {
            first_commitment: commitments.0,
            second_commitment: commitments.1,
            challenge,
            response,
        }
    }

    /// Returns the commitments `(X_G, X_K)`.
    pub fn commitments(&self) -> (&BigUint, &BigUint) {
        (&self.first_commitment, &self.second_commitment)
    }

    /// Returns the challenge scalar `c`.
    pub fn challenge(&self) -> &BigUint {
        &self.challenge
    }

    /// Returns the response scalar `s`.
    pub fn response(&self) -> &BigUint {
        &self.response
    }

    /// Computes commitments `(G^x, K^x)` for the nonce `x`.
    pub(crate) fn commit(
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        nonce: &BigUint,
    ) -> (BigUint, BigUint) {
        (params.pow(bases.0, nonce), params.pow(bases.1, nonce))
    }

    /// Computes the response `s = x + c * r mod q`.
    pub(crate) fn respond(
        params: &GroupParams,
        nonce: &BigUint,
        secret: &BigUint,
        challenge: &BigUint,
    ) -> BigUint {
        let secret = params.reduce_scalar(secret);
        let blinded_secret = params.mul_scalars(challenge, &secret);
        params.add_scalars(nonce, &blinded_secret)
    }

    /// Simulates a proof for the given challenge and response by back-solving commitments
    /// from the verification equations: `X_G = G^s / R^c`, `X_K = K^s / B^c`.
    pub(crate) fn simulate(
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        powers: (&BigUint, &BigUint),
        challenge: BigUint,
        response: BigUint,
    ) -> Self {
        let first_commitment = params.div(
            &params.pow(bases.0, &response),
            &params.pow(powers.0, &challenge),
        );
        let second_commitment = params.div(
            &params.pow(bases.1, &response),
            &params.pow(powers.1, &challenge),
        );
        Self {
            first_commitment,
            second_commitment,
            challenge,
            response,
        }
    }

    /// Checks that all proof components are in their admissible ranges.
    pub(crate) fn check_ranges(&self, params: &GroupParams) -> Result<(), VerificationError> {
        if !params.is_residue(&self.first_commitment) || !params.is_residue(&self.second_commitment)
        {
            return Err(VerificationError::OutOfRange("commitment"));
        }
        if !params.is_scalar(&self.challenge) {
            return Err(VerificationError::OutOfRange("challenge"));
        }
        if !params.is_scalar(&self.response) {
            return Err(VerificationError::OutOfRange("response"));
        }
        Ok(())
    }

    /// Checks both verification equations, assuming that components are in range.
    pub(crate) fn check_equations(
        &self,
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        powers: (&BigUint, &BigUint),
    ) -> bool {
        let first_lhs = params.pow(bases.0, &self.response);
        let first_rhs = params.mul(
            &self.first_commitment,
            &params.pow(powers.0, &self.challenge),
        );
        if first_lhs != first_rhs {
            return false;
        }
        let second_lhs = params.pow(bases.1, &self.response);
        let second_rhs = params.mul(
            &self.second_commitment,
            &params.pow(powers.1, &self.challenge),
        );
        second_lhs == second_rhs
    }

    /// Verifies this proof.
    ///
    /// # Parameters
    ///
    /// - `bases` are `G` and `K` in the notation above.
    /// - `powers` are group elements presumably equal to `G^r` and `K^r` respectively,
    ///   where `r` is a secret scalar.
    ///
    /// # Errors
    ///
    /// Returns an error if this proof does not verify.
    pub fn verify(
        &self,
        params: &GroupParams,
        bases: (&BigUint, &BigUint),
        powers: (&BigUint, &BigUint),
        transcript: &mut Transcript,
    ) -> Result<(), VerificationError> {
        self.check_ranges(params)?;
        if !params.is_residue(powers.0) || !params.is_residue(powers.1) {
            return Err(VerificationError::OutOfRange("proven power"));
        }

        Self::append_statement(transcript, params, bases, powers);
        transcript.append_element(b"[x]G", params, &self.first_commitment);
        transcript.append_element(b"[x]K", params, &self.second_commitment);
        let expected_challenge = transcript.challenge_scalar(b"c", params);
        if !scalars_eq(params, &expected_challenge, &self.challenge) {
            return Err(VerificationError::ChallengeMismatch);
        }

        if self.check_equations(params, bases, powers) {
            Ok(())
        } else {
            Err(VerificationError::EquationMismatch(0))
        }
    }
}
