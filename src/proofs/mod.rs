//! Zero-knowledge proofs.

use merlin::Transcript;
use num_bigint::BigUint;
use subtle::ConstantTimeEq;

use crate::group::GroupParams;

mod disjunctive;
mod log_equality;

pub use self::{disjunctive::DisjunctiveProof, log_equality::LogEqualityProof};

/// Extension trait for Merlin transcripts used in constructing our proofs.
pub(crate) trait TranscriptForGroup {
    fn start_proof(&mut self, proof_label: &'static [u8]);

    fn append_group(&mut self, params: &GroupParams);

    fn append_element(&mut self, label: &'static [u8], params: &GroupParams, element: &BigUint);

    fn challenge_scalar(&mut self, label: &'static [u8], params: &GroupParams) -> BigUint;
}

impl TranscriptForGroup for Transcript {
    fn start_proof(&mut self, proof_label: &'static [u8]) {
        self.append_message(b"dom-sep", proof_label);
    }

    fn append_group(&mut self, params: &GroupParams) {
        self.append_message(b"p", &params.modulus().to_bytes_be());
        self.append_message(b"g", &params.generator().to_bytes_be());
    }

    fn append_element(&mut self, label: &'static [u8], params: &GroupParams, element: &BigUint) {
        self.append_message(label, &params.element_bytes(element));
    }

    fn challenge_scalar(&mut self, label: &'static [u8], params: &GroupParams) -> BigUint {
        let mut seed = [0_u8; 32];
        self.challenge_bytes(label, &mut seed);
        params.scalar_from_seed(seed)
    }
}

/// Compares two scalars in constant time w.r.t. their fixed-width encodings.
pub(crate) fn scalars_eq(params: &GroupParams, lhs: &BigUint, rhs: &BigUint) -> bool {
    let lhs = params.element_bytes(lhs);
    let rhs = params.element_bytes(rhs);
    bool::from(lhs.as_slice().ct_eq(rhs.as_slice()))
}

/// Error verifying base proofs, such as [`LogEqualityProof`] or [`DisjunctiveProof`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// Restored challenge scalar does not match the one provided in the proof.
    ///
    /// This error most likely means that the proof itself is malformed, or that it was created
    /// for a different context than it is being verified for.
    #[error("restored challenge scalar does not match the one provided in the proof")]
    ChallengeMismatch,
    /// Verification equations do not hold for the specified proof branch.
    #[error("verification equations do not hold for proof branch #{0}")]
    EquationMismatch(usize),
    /// A proof component or a proven statement is outside its admissible range
    /// (e.g., a commitment is not a residue modulo `p`, or a response is not reduced modulo `q`).
    #[error("{0} is outside the admissible range")]
    OutOfRange(&'static str),
    /// A collection (e.g., the number of proof branches) has a different size
    /// than expected.
    ///
    /// This error most likely means that the proof is malformed.
    #[error("number of {collection} ({actual}) differs from expected ({expected})")]
    LenMismatch {
        /// Human-readable collection name, such as "choices".
        collection: &'static str,
        /// Expected size of the collection.
        expected: usize,
        /// Actual size of the collection.
        actual: usize,
    },
}

impl VerificationError {
    pub(crate) fn check_lengths(
        collection: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::LenMismatch {
                collection,
                expected,
                actual,
            })
        }
    }
}
