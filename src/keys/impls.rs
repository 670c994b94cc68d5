//! Operations on public / secret keys.

use merlin::Transcript;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};

use crate::{
    decryption::{CandidateDecryption, VerifiableDecryption},
    encryption::{EncryptionError, ExtendedCiphertext},
    Ciphertext, DiscreteLogTable, LogEqualityProof, PublicKey, SecretKey, VerificationError,
};

impl PublicKey {
    /// Encrypts a plaintext group element for this key.
    ///
    /// The plaintext must lie in `[1, p)`; zero or out-of-range plaintexts are rejected
    /// rather than reduced. If `randomness` is not supplied, it is sampled uniformly from
    /// `[1, p)`. Supplying the same randomness for several plaintexts is allowed
    /// (e.g., to encrypt all options of a ballot row), but such ciphertexts are linkable
    /// and must never span different ballots.
    ///
    /// # Errors
    ///
    /// Returns an error if `plaintext` or `randomness` is outside `[1, p)`.
    pub fn encrypt_element<R: CryptoRng + RngCore>(
        &self,
        plaintext: &BigUint,
        randomness: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<ExtendedCiphertext, EncryptionError> {
        let params = self.params();
        if !params.is_residue(plaintext) {
            return Err(EncryptionError::PlaintextOutOfRange);
        }
        let randomness = self.check_randomness(randomness, rng)?;

        let alpha = params.pow_generator(&randomness);
        let blinding = params.pow(self.as_element(), &randomness);
        let beta = params.mul(plaintext, &blinding);
        Ok(ExtendedCiphertext {
            inner: Ciphertext { alpha, beta },
            randomness,
        })
    }

    fn check_randomness<R: CryptoRng + RngCore>(
        &self,
        randomness: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<BigUint, EncryptionError> {
        match randomness {
            Some(randomness) if self.params().is_residue(randomness) => Ok(randomness.clone()),
            Some(_) => Err(EncryptionError::RandomnessOutOfRange),
            None => Ok(self.params().random_residue(rng)),
        }
    }

    /// Encrypts a small value using exponential encoding, i.e., encrypts `g^value`.
    pub fn encrypt<R: CryptoRng + RngCore>(&self, value: u64, rng: &mut R) -> Ciphertext {
        let params = self.params();
        let randomness = params.random_residue(rng);
        let alpha = params.pow_generator(&randomness);
        let blinding = params.pow(self.as_element(), &randomness);
        let beta = params.mul(&params.encode(value), &blinding);
        Ciphertext { alpha, beta }
    }

    /// Re-randomizes `ciphertext` by multiplying it with a fresh encryption of the identity.
    /// The result decrypts to the same plaintext, but is unlinkable to the original ciphertext
    /// for anyone not knowing the secret key.
    ///
    /// If `randomness` is not supplied, it is sampled uniformly from `[1, p)`. The returned
    /// extended ciphertext contains the randomness of the re-encryption step only.
    ///
    /// # Errors
    ///
    /// Returns an error if `ciphertext` is malformed or `randomness` is outside `[1, p)`.
    pub fn reencrypt<R: CryptoRng + RngCore>(
        &self,
        ciphertext: &Ciphertext,
        randomness: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<ExtendedCiphertext, EncryptionError> {
        let params = self.params();
        if !ciphertext.is_well_formed(params) {
            return Err(EncryptionError::MalformedCiphertext);
        }
        let randomness = self.check_randomness(randomness, rng)?;

        let alpha = params.mul(&ciphertext.alpha, &params.pow_generator(&randomness));
        let beta = params.mul(&ciphertext.beta, &params.pow(self.as_element(), &randomness));
        Ok(ExtendedCiphertext {
            inner: Ciphertext { alpha, beta },
            randomness,
        })
    }

    /// Verifies a proof that `ciphertext` decrypts to the group element `plaintext` under
    /// this key. The proof is presumably produced by [`SecretKey::decrypt_with_proof()`].
    ///
    /// # Errors
    ///
    /// Returns an error if `plaintext` is not a residue or the `proof` does not verify.
    pub fn verify_decryption(
        &self,
        ciphertext: &Ciphertext,
        plaintext: &BigUint,
        proof: &LogEqualityProof,
    ) -> Result<(), VerificationError> {
        let params = self.params();
        if !params.is_residue(plaintext) || !ciphertext.is_well_formed(params) {
            return Err(VerificationError::OutOfRange("decrypted plaintext"));
        }
        let dh_element = params.div(&ciphertext.beta, plaintext);
        CandidateDecryption::from_element(dh_element).verify(
            ciphertext,
            self,
            proof,
            &mut Transcript::new(b"decryption"),
        )?;
        Ok(())
    }
}

impl SecretKey {
    /// Decrypts the provided ciphertext and returns the produced group element
    /// `beta * alpha^(-x) mod p`. The exponent is reduced modulo `q` first, so this works
    /// for secret exponents sampled from either [`SecretExponentRange`].
    ///
    /// As the ciphertext does not include a MAC or another way to assert integrity,
    /// this operation cannot fail. If the ciphertext is not produced properly (e.g., it targets
    /// another receiver), the returned element will be garbage.
    ///
    /// [`SecretExponentRange`]: crate::SecretExponentRange
    pub fn decrypt_to_element(&self, ciphertext: &Ciphertext) -> BigUint {
        let params = self.params();
        let negated_exponent = params.sub_scalars(params.order(), self.expose_exponent());
        let unblinding = params.pow(&ciphertext.alpha, &negated_exponent);
        params.mul(&ciphertext.beta, &unblinding)
    }

    /// Decrypts the provided ciphertext and returns the original encrypted value.
    ///
    /// `lookup_table` is used to find encrypted values based on the decrypted group element.
    /// That is, it must contain all valid plaintext values. If the value is not in the table,
    /// this method will return `None`.
    pub fn decrypt(&self, ciphertext: &Ciphertext, lookup_table: &DiscreteLogTable) -> Option<u64> {
        lookup_table.get(&self.decrypt_to_element(ciphertext))
    }

    /// Decrypts `ciphertext` to a group element and proves correctness of the decryption.
    /// The proof can be verified with [`PublicKey::verify_decryption()`].
    pub fn decrypt_with_proof<R: CryptoRng + RngCore>(
        &self,
        ciphertext: &Ciphertext,
        rng: &mut R,
    ) -> (BigUint, LogEqualityProof) {
        let (decryption, proof) =
            VerifiableDecryption::new(ciphertext, self, &mut Transcript::new(b"decryption"), rng);
        (decryption.decrypt_to_element(ciphertext, self.params()), proof)
    }
}
