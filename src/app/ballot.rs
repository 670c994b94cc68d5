//! Ballot data model and the ballot encoder.

use merlin::Transcript;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use crate::{
    serde::DecimalHelper, Ciphertext, DisjunctiveProof, LogEqualityProof, PublicKey,
    VerificationError,
};

const NO_VOTE: &str = "noVote";
const INVALID: &str = "invalid";

/// Transcript label for row proofs.
const ROW_PROOF_LABEL: &[u8] = b"evote_ballot_row";
/// Transcript label for per-option bit proofs.
const BIT_PROOF_LABEL: &[u8] = b"evote_ballot_option";

/// Identifier of an option in a ballot row: a candidate, or one of the two reserved options.
///
/// On the wire, option ids are strings; the reserved options are encoded as `"noVote"` and
/// `"invalid"`. Options are ordered by their wire representation (i.e., alphabetically),
/// which is the canonical order of options within a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionId {
    /// Candidate with the specified identifier.
    Candidate(String),
    /// Explicit abstention.
    NoVote,
    /// Intentionally invalidated vote.
    Invalid,
}

/// Error returned when a candidate identifier collides with a reserved option id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("candidate id `{0}` collides with a reserved option id")]
pub struct ReservedIdError(pub String);

impl OptionId {
    /// Creates a candidate option.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` equals one of the reserved strings.
    pub fn candidate(id: impl Into<String>) -> Result<Self, ReservedIdError> {
        let id = id.into();
        if id == NO_VOTE || id == INVALID {
            Err(ReservedIdError(id))
        } else {
            Ok(Self::Candidate(id))
        }
    }

    /// Returns the wire representation of this id.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Candidate(id) => id,
            Self::NoVote => NO_VOTE,
            Self::Invalid => INVALID,
        }
    }

    /// Returns the candidate identifier, or `None` for reserved options.
    pub fn as_candidate(&self) -> Option<&str> {
        match self {
            Self::Candidate(id) => Some(id),
            Self::NoVote | Self::Invalid => None,
        }
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for OptionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            NO_VOTE => Self::NoVote,
            INVALID => Self::Invalid,
            candidate => Self::Candidate(candidate.to_owned()),
        })
    }
}

impl Ord for OptionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for OptionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for OptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        if id.is_empty() {
            return Err(D::Error::custom("option id cannot be empty"));
        }
        id.parse::<Self>().map_err(D::Error::custom)
    }
}

/// Returns the full option set of a section: configured candidates plus both reserved options.
///
/// # Errors
///
/// Returns an error if any candidate id collides with a reserved id.
pub fn section_options<'a, I>(candidates: I) -> Result<BTreeSet<OptionId>, ReservedIdError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut options: BTreeSet<_> = candidates
        .into_iter()
        .map(|id| OptionId::candidate(id.as_str()))
        .collect::<Result<_, _>>()?;
    options.insert(OptionId::NoVote);
    options.insert(OptionId::Invalid);
    Ok(options)
}

/// Encrypted option of a ballot row: the ciphertext of `g^0` or `g^1` together with
/// the branch of the row's disjunctive proof for this option, and a proof that the ciphertext
/// encrypts either `g^0` or `g^1`.
///
/// Serialized as `{ "alpha", "beta", "commitment1", "commitment2", "challenge", "response",
/// "bitProof" }`, where `bitProof` is a list of two proof branches in the same format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedOption {
    #[serde(flatten)]
    ciphertext: Ciphertext,
    #[serde(flatten)]
    proof: LogEqualityProof,
    bit_proof: DisjunctiveProof,
}

impl EncryptedOption {
    /// Creates an encrypted option from its parts.
    pub fn new(ciphertext: Ciphertext, proof: LogEqualityProof, bit_proof: DisjunctiveProof) -> Self {
        Self {
            ciphertext,
            proof,
            bit_proof,
        }
    }

    /// Returns the ciphertext of this option.
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }

    /// Returns the proof branch for this option.
    pub fn proof(&self) -> &LogEqualityProof {
        &self.proof
    }

    /// Returns the proof that this option encrypts `g^0` or `g^1`.
    pub fn bit_proof(&self) -> &DisjunctiveProof {
        &self.bit_proof
    }

    pub(crate) fn ciphertext_mut(&mut self) -> &mut Ciphertext {
        &mut self.ciphertext
    }
}

/// Encrypted ballot row: option id → encrypted option. Iteration follows the canonical
/// option order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRow {
    options: BTreeMap<OptionId, EncryptedOption>,
}

impl EncryptedRow {
    /// Returns the number of options in this row.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Checks whether this row has no options.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Gets the encrypted option with the specified id.
    pub fn get(&self, option: &OptionId) -> Option<&EncryptedOption> {
        self.options.get(option)
    }

    /// Iterates over option ids in the canonical order.
    pub fn option_ids(&self) -> impl Iterator<Item = &OptionId> + '_ {
        self.options.keys()
    }

    /// Iterates over options in the canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&OptionId, &EncryptedOption)> + '_ {
        self.options.iter()
    }

    /// Inserts an option into this row, returning the previous value if any.
    pub fn insert(&mut self, option: OptionId, encrypted: EncryptedOption) -> Option<EncryptedOption> {
        self.options.insert(option, encrypted)
    }

    pub(crate) fn get_mut(&mut self, option: &OptionId) -> Option<&mut EncryptedOption> {
        self.options.get_mut(option)
    }

    /// Returns ciphertexts in the canonical option order.
    pub fn ciphertexts(&self) -> Vec<Ciphertext> {
        self.options.values().map(|option| option.ciphertext.clone()).collect()
    }

    /// Returns the row's disjunctive proof assembled from per-option branches.
    pub fn proof(&self) -> DisjunctiveProof {
        let branches = self.options.values().map(|option| option.proof.clone());
        DisjunctiveProof::from_branches(branches.collect())
    }
}

/// Encrypted section of a ballot: a list of rows sharing the same option set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSection {
    /// Encrypted rows.
    pub votes: Vec<EncryptedRow>,
}

/// Filled ballot paper as submitted by a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledBallotPaper {
    /// Identifier of the ballot paper.
    pub ballot_paper_id: String,
    /// Encrypted sections keyed by section id.
    pub sections: BTreeMap<String, EncryptedSection>,
}

/// Error constructing a plaintext row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RowError {
    /// Row contains no options.
    #[error("row has no options")]
    Empty,
    /// Chosen option is not among the row options.
    #[error("option `{0}` is not present in the row")]
    UnknownChoice(OptionId),
    /// Row bits are not one-hot.
    #[error("row must contain exactly one 1 bit and only 0 / 1 bits")]
    NotOneHot,
    /// Rows of a section have different option sets.
    #[error("row #{0} has a different option set than the first row")]
    OptionSetMismatch(usize),
}

/// Plaintext one-hot ballot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainRow {
    options: Vec<OptionId>,
    choice: usize,
}

impl PlainRow {
    /// Creates a row over `options` with `choice` set to 1 and all other options set to 0.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` is empty or does not contain `choice`.
    pub fn one_hot(options: &BTreeSet<OptionId>, choice: &OptionId) -> Result<Self, RowError> {
        if options.is_empty() {
            return Err(RowError::Empty);
        }
        let choice_index = options
            .iter()
            .position(|option| option == choice)
            .ok_or_else(|| RowError::UnknownChoice(choice.clone()))?;
        Ok(Self {
            options: options.iter().cloned().collect(),
            choice: choice_index,
        })
    }

    /// Creates a row from explicit bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the bits are not one-hot, or if the row is empty.
    pub fn from_bits(bits: &BTreeMap<OptionId, u8>) -> Result<Self, RowError> {
        if bits.is_empty() {
            return Err(RowError::Empty);
        }
        if bits.values().any(|&bit| bit > 1) || bits.values().filter(|&&bit| bit == 1).count() != 1
        {
            return Err(RowError::NotOneHot);
        }
        let choice = bits
            .values()
            .position(|&bit| bit == 1)
            .ok_or(RowError::NotOneHot)?;
        Ok(Self {
            options: bits.keys().cloned().collect(),
            choice,
        })
    }

    /// Returns options of this row in the canonical order.
    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    /// Returns the chosen option.
    pub fn choice(&self) -> &OptionId {
        &self.options[self.choice]
    }

    /// Returns plaintext bits in the canonical option order.
    pub fn bits(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.options.len()).map(move |i| u64::from(i == self.choice))
    }
}

/// Auditable record of an encrypted row: ciphertexts in the canonical option order
/// together with the shared randomness.
///
/// The randomness allows anyone to check which plaintexts the ciphertexts encrypt,
/// so the record must stay with the voter (or an audit workflow acting on their behalf).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditableRow {
    /// Ciphertexts in the canonical option order.
    pub ciphertexts: Vec<Ciphertext>,
    /// Randomness shared by all ciphertexts of the row.
    #[serde(with = "DecimalHelper")]
    pub randomness: BigUint,
}

impl fmt::Debug for AuditableRow {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuditableRow")
            .field("ciphertexts", &self.ciphertexts)
            .finish_non_exhaustive()
    }
}

/// Receiver of [`AuditableRow`]s produced by the [`BallotEncoder`].
///
/// `()` discards records; `Vec<AuditableRow>` collects them.
pub trait AuditSink {
    /// Records an auditable row.
    fn record(&mut self, row: AuditableRow);
}

impl AuditSink for () {
    fn record(&mut self, _row: AuditableRow) {
        // Records are discarded.
    }
}

impl AuditSink for Vec<AuditableRow> {
    fn record(&mut self, row: AuditableRow) {
        self.push(row);
    }
}

/// Claimed plaintexts for a row proof of the specified width: `g^1` for every option.
///
/// The row proof thus attests that *some* option of the row encrypts 1 under the row's
/// shared randomness. This statement can be checked without knowing which option was chosen.
pub fn row_choices(receiver: &PublicKey, width: usize) -> Vec<BigUint> {
    vec![receiver.params().encode(1); width]
}

/// Claimed plaintexts for a bit proof: `[g^0, g^1]`.
fn bit_choices(receiver: &PublicKey) -> [BigUint; 2] {
    let params = receiver.params();
    [params.encode(0), params.encode(1)]
}

fn bit_transcript(option: &OptionId) -> Transcript {
    let mut transcript = Transcript::new(BIT_PROOF_LABEL);
    transcript.append_message(b"option", option.as_str().as_bytes());
    transcript
}

/// Encoder and encryptor of ballot rows for a specific election key.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{
/// #     app::{section_options, verify_row, BallotEncoder, OptionId, PlainRow},
/// #     group::GroupParams, Keypair,
/// # };
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GroupParams::rfc3526_2048();
/// let mut rng = thread_rng();
/// let keypair = Keypair::generate(&params, &mut rng);
/// let encoder = BallotEncoder::new(keypair.public());
///
/// let options = section_options(&["alice".to_owned(), "bob".to_owned()])?;
/// let row = PlainRow::one_hot(&options, &OptionId::candidate("bob")?)?;
/// let (encrypted, audit) = encoder.encrypt_row(&row, &mut rng);
/// assert_eq!(encrypted.len(), 4);
/// assert_eq!(audit.ciphertexts.len(), 4);
/// verify_row(keypair.public(), &encrypted)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BallotEncoder<'a> {
    receiver: &'a PublicKey,
}

impl<'a> BallotEncoder<'a> {
    /// Creates an encoder for the specified election key.
    pub fn new(receiver: &'a PublicKey) -> Self {
        Self { receiver }
    }

    /// Encrypts a plaintext row.
    ///
    /// Each option bit `b` is encoded as `g^b` and encrypted in the canonical option order.
    /// **All options of the row share one randomness value**: it is sampled when encrypting
    /// the first option and reused for the rest. The row's [`DisjunctiveProof`] relies on this;
    /// a single nonce covers the whole row. Randomness is never shared across rows.
    ///
    /// Besides the row proof, every option gets a [bit proof](Self::prove_bit()) showing that
    /// it encrypts `g^0` or `g^1`.
    ///
    /// Returns the encrypted row together with its auditable record.
    pub fn encrypt_row<R: CryptoRng + RngCore>(
        &self,
        row: &PlainRow,
        rng: &mut R,
    ) -> (EncryptedRow, AuditableRow) {
        let params = self.receiver.params();
        let mut randomness: Option<BigUint> = None;
        let mut ciphertexts = Vec::with_capacity(row.options.len());
        for bit in row.bits() {
            let plaintext = params.encode(bit);
            let encrypted = match self.receiver.encrypt_element(&plaintext, randomness.as_ref(), rng)
            {
                Ok(encrypted) => encrypted,
                // `g^0` and `g^1` are in `[1, p)`, and the randomness is produced by
                // the first encryption.
                Err(err) => unreachable!("encoding a bit cannot fail: {err}"),
            };
            let (ciphertext, row_randomness) = encrypted.into_parts();
            randomness.get_or_insert(row_randomness);
            ciphertexts.push(ciphertext);
        }
        let Some(randomness) = randomness else {
            unreachable!("`PlainRow` is never empty");
        };

        let proof = self.prove_row(&ciphertexts, row.choice, &randomness, rng);
        let options = row
            .options
            .iter()
            .zip(&ciphertexts)
            .zip(proof.into_branches())
            .enumerate()
            .map(|(i, ((option, ciphertext), branch))| {
                let bit_proof = self.prove_bit(option, ciphertext, i == row.choice, &randomness, rng);
                let encrypted = EncryptedOption::new(ciphertext.clone(), branch, bit_proof);
                (option.clone(), encrypted)
            })
            .collect();
        let audit = AuditableRow {
            ciphertexts,
            randomness,
        };
        (EncryptedRow { options }, audit)
    }

    /// Proves that the option at `real_index` of a row encrypts `g^1` under the shared
    /// row `randomness` (see [`row_choices()`]). `ciphertexts` must be in the canonical
    /// option order.
    ///
    /// # Panics
    ///
    /// Panics if `ciphertexts` is empty or `real_index` is out of bounds.
    pub fn prove_row<R: CryptoRng + RngCore>(
        &self,
        ciphertexts: &[Ciphertext],
        real_index: usize,
        randomness: &BigUint,
        rng: &mut R,
    ) -> DisjunctiveProof {
        DisjunctiveProof::new(
            self.receiver,
            ciphertexts,
            &row_choices(self.receiver, ciphertexts.len()),
            real_index,
            randomness,
            &mut Transcript::new(ROW_PROOF_LABEL),
            rng,
        )
    }

    /// Proves that `ciphertext`, produced for `option` with `randomness`, encrypts `g^bit`
    /// with `bit` being 0 or 1, without revealing `bit`. The proof is bound to the option id.
    ///
    /// If `ciphertext` does not encrypt `g^bit` with `randomness`, the produced proof
    /// will not verify.
    pub fn prove_bit<R: CryptoRng + RngCore>(
        &self,
        option: &OptionId,
        ciphertext: &Ciphertext,
        bit: bool,
        randomness: &BigUint,
        rng: &mut R,
    ) -> DisjunctiveProof {
        let ciphertexts = [ciphertext.clone(), ciphertext.clone()];
        DisjunctiveProof::new(
            self.receiver,
            &ciphertexts,
            &bit_choices(self.receiver),
            usize::from(bit),
            randomness,
            &mut bit_transcript(option),
            rng,
        )
    }

    /// Encrypts a section consisting of `rows`, emitting an auditable record per row
    /// into `audit`.
    ///
    /// # Errors
    ///
    /// Returns an error if rows have different option sets.
    pub fn encrypt_section<R, A>(
        &self,
        rows: &[PlainRow],
        audit: &mut A,
        rng: &mut R,
    ) -> Result<EncryptedSection, RowError>
    where
        R: CryptoRng + RngCore,
        A: AuditSink + ?Sized,
    {
        if let Some(first) = rows.first() {
            if let Some(i) = rows.iter().position(|row| row.options != first.options) {
                return Err(RowError::OptionSetMismatch(i));
            }
        }

        let votes = rows
            .iter()
            .map(|row| {
                let (encrypted, record) = self.encrypt_row(row, rng);
                audit.record(record);
                encrypted
            })
            .collect();
        Ok(EncryptedSection { votes })
    }
}

/// Verifies the proofs of an encrypted row: all options share the same `alpha` (i.e., the same
/// randomness), the disjunctive proof for [`row_choices()`] holds, and every option encrypts
/// `g^0` or `g^1`.
///
/// Together, these proofs show that the row contains only 0 / 1 bits and at least one 1 bit.
/// A row with several 1 bits passes this check; it is detected after decryption
/// since the decrypted counts of a section then exceed the number of its rows.
///
/// # Errors
///
/// Returns an error if the row is empty, its options use different randomness, or any proof
/// does not verify.
pub fn verify_row(receiver: &PublicKey, row: &EncryptedRow) -> Result<(), VerificationError> {
    let ciphertexts = row.ciphertexts();
    let Some(first) = ciphertexts.first() else {
        return Err(VerificationError::OutOfRange("number of ciphertexts"));
    };
    if ciphertexts.iter().any(|ciphertext| ciphertext.alpha != first.alpha) {
        return Err(VerificationError::OutOfRange("row randomness"));
    }
    let choices = row_choices(receiver, ciphertexts.len());
    row.proof().verify(
        receiver,
        &ciphertexts,
        &choices,
        &mut Transcript::new(ROW_PROOF_LABEL),
    )?;

    let bit_plaintexts = bit_choices(receiver);
    for (option, encrypted) in row.iter() {
        let ciphertexts = [encrypted.ciphertext.clone(), encrypted.ciphertext.clone()];
        encrypted.bit_proof.verify(
            receiver,
            &ciphertexts,
            &bit_plaintexts,
            &mut bit_transcript(option),
        )?;
    }
    Ok(())
}
