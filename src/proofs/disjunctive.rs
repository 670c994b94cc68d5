//! Disjunctive (OR) composition of Chaum–Pedersen proofs.

use merlin::Transcript;
use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    proofs::{scalars_eq, LogEqualityProof, TranscriptForGroup, VerificationError},
    Ciphertext, PublicKey,
};

/// Zero-knowledge proof that at least one of several ciphertexts encrypts its claimed
/// plaintext, without revealing which one.
///
/// # Construction
///
/// For ciphertexts `(alpha_i, beta_i)` and claimed plaintext elements `m_i` (the *choices*),
/// the statement for index `i` is that `alpha_i = g^r` and `beta_i / m_i = h^r` for the same `r`,
/// i.e., a [`LogEqualityProof`] statement with bases `(g, h)` and powers
/// `(alpha_i, beta_i / m_i)`. The disjunction of these statements is proven using the standard
/// OR composition of sigma protocols:
///
/// 1. For every index except the real one, the prover picks a random challenge `c_i` and response
///   `s_i` and back-solves the commitments from the verification equations.
/// 2. For the real index, the prover picks a nonce `x` and commits to `(g^x, h^x)`.
/// 3. All commitments (in the index order) are hashed together with the public key,
///   ciphertexts and choices into the combined challenge `c`.
/// 4. The real challenge is `c - sum(c_i) mod q`; the real response is `x + r * c_real mod q`.
///
/// The verifier recomputes `c`, checks that it equals the sum of all branch challenges
/// modulo `q`, and checks both verification equations for every branch.
///
/// Since all branch challenges but one can be chosen freely, an honest-looking proof requires
/// knowing `r` for at least one branch, which is exactly the proven statement.
///
/// # Serialization
///
/// The proof is serialized as a sequence of [`LogEqualityProof`]s, one per index.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{group::GroupParams, Ciphertext, DisjunctiveProof, Keypair};
/// # use merlin::Transcript;
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GroupParams::rfc3526_2048();
/// let mut rng = thread_rng();
/// let receiver = Keypair::generate(&params, &mut rng);
/// let receiver = receiver.public();
///
/// // Encrypt 0, 1, 0 under a shared randomness.
/// let first = receiver.encrypt_element(&params.encode(0), None, &mut rng)?;
/// let randomness = first.randomness().clone();
/// let ciphertexts: Vec<Ciphertext> = vec![
///     first.into(),
///     receiver.encrypt_element(&params.encode(1), Some(&randomness), &mut rng)?.into(),
///     receiver.encrypt_element(&params.encode(0), Some(&randomness), &mut rng)?.into(),
/// ];
/// // Prove that *some* ciphertext encrypts 1.
/// let choices = vec![params.encode(1); 3];
/// let proof = DisjunctiveProof::new(
///     receiver,
///     &ciphertexts,
///     &choices,
///     1,
///     &randomness,
///     &mut Transcript::new(b"row"),
///     &mut rng,
/// );
/// proof.verify(receiver, &ciphertexts, &choices, &mut Transcript::new(b"row"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisjunctiveProof {
    branches: Vec<LogEqualityProof>,
}

impl DisjunctiveProof {
    /// Creates a new proof.
    ///
    /// # Parameters
    ///
    /// - `ciphertexts` are the ciphertexts the statement is about.
    /// - `choices` are the claimed plaintext elements, one per ciphertext.
    /// - `real_index` is the index for which the prover knows that
    ///   `ciphertexts[real_index]` encrypts `choices[real_index]` with `randomness`.
    ///   If this is not the case, the produced proof will not [`verify`](Self::verify()).
    ///
    /// # Panics
    ///
    /// Panics if `ciphertexts` is empty, if lengths of `ciphertexts` and `choices` differ,
    /// or if `real_index` is out of bounds.
    pub fn new<R: CryptoRng + RngCore>(
        receiver: &PublicKey,
        ciphertexts: &[Ciphertext],
        choices: &[BigUint],
        real_index: usize,
        randomness: &BigUint,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Self {
        assert!(!ciphertexts.is_empty(), "no ciphertexts supplied");
        assert_eq!(
            ciphertexts.len(),
            choices.len(),
            "number of choices differs from the number of ciphertexts"
        );
        assert!(
            real_index < ciphertexts.len(),
            "invalid real index {real_index}; expected a value in 0..{}",
            ciphertexts.len()
        );

        let params = receiver.params();
        let bases = (params.generator(), receiver.as_element());
        Self::append_statement(transcript, receiver, ciphertexts, choices);

        let nonce = params.random_scalar(rng);
        let real_commitments = LogEqualityProof::commit(params, bases, &nonce);
        let mut challenge_sum = BigUint::zero();
        let mut branches: Vec<_> = ciphertexts
            .iter()
            .zip(choices)
            .enumerate()
            .map(|(i, (ciphertext, choice))| {
                if i == real_index {
                    let commitments = real_commitments.clone();
                    let placeholder = (BigUint::zero(), BigUint::zero());
                    return LogEqualityProof::from_parts(commitments, placeholder.0, placeholder.1);
                }
                let challenge = params.random_scalar(rng);
                let response = params.random_scalar(rng);
                challenge_sum = params.add_scalars(&challenge_sum, &challenge);
                let unblinded = params.div(&ciphertext.beta, choice);
                LogEqualityProof::simulate(
                    params,
                    bases,
                    (&ciphertext.alpha, &unblinded),
                    challenge,
                    response,
                )
            })
            .collect();

        for branch in &branches {
            let (first, second) = branch.commitments();
            transcript.append_element(b"[x]G", params, first);
            transcript.append_element(b"[x]K", params, second);
        }
        let combined_challenge = transcript.challenge_scalar(b"c", params);
        let real_challenge = params.sub_scalars(&combined_challenge, &challenge_sum);
        let real_response = LogEqualityProof::respond(params, &nonce, randomness, &real_challenge);
        branches[real_index] =
            LogEqualityProof::from_parts(real_commitments, real_challenge, real_response);

        Self { branches }
    }

    fn append_statement(
        transcript: &mut Transcript,
        receiver: &PublicKey,
        ciphertexts: &[Ciphertext],
        choices: &[BigUint],
    ) {
        let params = receiver.params();
        transcript.start_proof(b"disjunctive");
        transcript.append_group(params);
        transcript.append_element(b"K", params, receiver.as_element());
        transcript.append_u64(b"n", ciphertexts.len() as u64);
        for (ciphertext, choice) in ciphertexts.iter().zip(choices) {
            transcript.append_element(b"alpha", params, &ciphertext.alpha);
            transcript.append_element(b"beta", params, &ciphertext.beta);
            transcript.append_element(b"m", params, choice);
        }
    }

    /// Creates a proof from its branches without any checks.
    pub fn from_branches(branches: Vec<LogEqualityProof>) -> Self {
        Self { branches }
    }

    /// Returns per-index proof branches.
    pub fn branches(&self) -> &[LogEqualityProof] {
        &self.branches
    }

    /// Converts this proof into per-index branches.
    pub fn into_branches(self) -> Vec<LogEqualityProof> {
        self.branches
    }

    /// Verifies this proof for the specified `ciphertexts` and claimed `choices`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection lengths are inconsistent, if any component
    /// is out of range, or if the proof does not verify.
    pub fn verify(
        &self,
        receiver: &PublicKey,
        ciphertexts: &[Ciphertext],
        choices: &[BigUint],
        transcript: &mut Transcript,
    ) -> Result<(), VerificationError> {
        if ciphertexts.is_empty() {
            return Err(VerificationError::OutOfRange("number of ciphertexts"));
        }
        VerificationError::check_lengths("choices", ciphertexts.len(), choices.len())?;
        VerificationError::check_lengths("proof branches", ciphertexts.len(), self.branches.len())?;

        let params = receiver.params();
        for ((ciphertext, choice), branch) in ciphertexts.iter().zip(choices).zip(&self.branches) {
            if !ciphertext.is_well_formed(params) {
                return Err(VerificationError::OutOfRange("ciphertext"));
            }
            if !params.is_residue(choice) {
                return Err(VerificationError::OutOfRange("choice"));
            }
            branch.check_ranges(params)?;
        }

        Self::append_statement(transcript, receiver, ciphertexts, choices);
        let mut challenge_sum = BigUint::zero();
        for branch in &self.branches {
            let (first, second) = branch.commitments();
            transcript.append_element(b"[x]G", params, first);
            transcript.append_element(b"[x]K", params, second);
            challenge_sum = params.add_scalars(&challenge_sum, branch.challenge());
        }
        let combined_challenge = transcript.challenge_scalar(b"c", params);
        if !scalars_eq(params, &combined_challenge, &challenge_sum) {
            return Err(VerificationError::ChallengeMismatch);
        }

        let bases = (params.generator(), receiver.as_element());
        for (i, (ciphertext, choice)) in ciphertexts.iter().zip(choices).enumerate() {
            let unblinded = params.div(&ciphertext.beta, choice);
            if !self.branches[i].check_equations(params, bases, (&ciphertext.alpha, &unblinded)) {
                return Err(VerificationError::EquationMismatch(i));
            }
        }
        Ok(())
    }
}
