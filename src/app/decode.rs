//! Decoding of encrypted ballot sections into vote counts.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use super::ballot::{EncryptedSection, OptionId};
use crate::{
    group::GroupParams,
    tally::{aggregate_votes, TallyError},
    Ciphertext, DiscreteLogTable, SecretKey,
};

/// Error decoding an encrypted section.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Section contains no rows.
    #[error("section `{0}` has no rows")]
    EmptySection(String),
    /// A row lacks an option present in the first row.
    #[error("row #{row} lacks option `{option}`")]
    MissingOption {
        /// Zero-based row index.
        row: usize,
        /// Missing option.
        option: OptionId,
    },
    /// A row contains options absent from the first row.
    #[error("row #{0} contains options absent from the first row")]
    UnexpectedOption(usize),
    /// An aggregated count is not covered by the lookup table. This happens if the section
    /// contains more rows than the table covers, or if a ciphertext does not encrypt
    /// a small value (e.g., it was tampered with).
    #[error("count for option `{option}` in section `{section}` exceeds lookup table bound {max_value}")]
    LookupExhausted {
        /// Section identifier.
        section: String,
        /// Option with the unrecoverable count.
        option: OptionId,
        /// Largest value covered by the lookup table.
        max_value: u64,
    },
    /// Aggregation error.
    #[error("cannot aggregate rows: {0}")]
    Tally(#[from] TallyError),
}

/// Decoded vote counts for a section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedSection {
    /// Number of votes for each candidate.
    pub candidate_results: BTreeMap<String, u64>,
    /// Number of explicit abstentions.
    pub no_vote_count: u64,
    /// Number of invalidated rows.
    pub invalid_count: u64,
}

impl DecodedSection {
    /// Returns the total number of votes cast for candidates.
    pub fn candidate_votes(&self) -> u64 {
        self.candidate_results.values().sum()
    }

    fn record(&mut self, option: OptionId, count: u64) {
        match option {
            OptionId::Candidate(id) => {
                *self.candidate_results.entry(id).or_default() += count;
            }
            OptionId::NoVote => self.no_vote_count += count,
            OptionId::Invalid => self.invalid_count += count,
        }
    }
}

/// Builds a lookup table covering counts `0..=max_votes`.
///
/// A section with `n` rows needs a table with `max_votes >= n`; the count for any single
/// option cannot exceed the number of rows.
pub fn calculate_lookup_table(params: &GroupParams, max_votes: u64) -> DiscreteLogTable {
    DiscreteLogTable::new(params, max_votes)
}

/// Homomorphic accumulator of encrypted sections sharing the same option set.
///
/// Unlike [`decrypt_section()`], which is applied to a single ballot, a tally combines
/// sections from many ballots before decryption, so that individual ballots are never
/// decrypted.
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{
/// #     app::{calculate_lookup_table, section_options, BallotEncoder, OptionId, PlainRow, SectionTally},
/// #     group::GroupParams, Keypair,
/// # };
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GroupParams::rfc3526_2048();
/// let mut rng = thread_rng();
/// let keypair = Keypair::generate(&params, &mut rng);
/// let encoder = BallotEncoder::new(keypair.public());
/// let options = section_options(&["alice".to_owned(), "bob".to_owned()])?;
///
/// let mut tally = SectionTally::default();
/// for choice in ["alice", "bob", "alice"] {
///     let row = PlainRow::one_hot(&options, &OptionId::candidate(choice)?)?;
///     let section = encoder.encrypt_section(&[row], &mut (), &mut rng)?;
///     tally.add_section(&params, &section)?;
/// }
/// let table = calculate_lookup_table(&params, tally.rows());
/// let decoded = tally.decrypt(keypair.secret(), "president", &table)?;
/// assert_eq!(decoded.candidate_results["alice"], 2);
/// assert_eq!(decoded.candidate_results["bob"], 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SectionTally {
    options: Vec<OptionId>,
    columns: Vec<Ciphertext>,
    rows: u64,
}

impl SectionTally {
    /// Creates a tally from a single section.
    ///
    /// # Errors
    ///
    /// Returns an error if rows of the section have different option sets.
    pub fn from_section(params: &GroupParams, section: &EncryptedSection) -> Result<Self, DecodeError> {
        let mut tally = Self::default();
        tally.add_section(params, section)?;
        Ok(tally)
    }

    /// Returns the options of this tally in the canonical order.
    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    /// Returns the number of rows accumulated so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Returns aggregated ciphertexts in the canonical option order.
    pub fn columns(&self) -> &[Ciphertext] {
        &self.columns
    }

    /// Adds all rows of `section` to this tally. The option set of the first accumulated
    /// row fixes the option set for all subsequent rows.
    ///
    /// # Errors
    ///
    /// Returns an error if any row has a different option set. In this case, the tally
    /// is not modified.
    pub fn add_section(
        &mut self,
        params: &GroupParams,
        section: &EncryptedSection,
    ) -> Result<(), DecodeError> {
        let Some(first_row) = section.votes.first() else {
            return Ok(());
        };
        let options: Vec<OptionId> = if self.options.is_empty() {
            first_row.option_ids().cloned().collect()
        } else {
            self.options.clone()
        };

        let mut rows = Vec::with_capacity(section.votes.len());
        for (i, row) in section.votes.iter().enumerate() {
            if row.len() > options.len() {
                return Err(DecodeError::UnexpectedOption(i));
            }
            let ciphertexts = options
                .iter()
                .map(|option| {
                    row.get(option)
                        .map(|encrypted| encrypted.ciphertext().clone())
                        .ok_or_else(|| DecodeError::MissingOption {
                            row: i,
                            option: option.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(ciphertexts);
        }

        let section_columns = aggregate_votes(params, &rows)?;
        if self.columns.is_empty() {
            self.columns = section_columns;
        } else {
            for (column, ciphertext) in self.columns.iter_mut().zip(&section_columns) {
                column.combine_assign(ciphertext, params);
            }
        }
        self.options = options;
        self.rows += rows.len() as u64;
        Ok(())
    }

    /// Decrypts the aggregated columns of this tally.
    ///
    /// # Errors
    ///
    /// Returns an error if the tally is empty, or if any count is not covered
    /// by `lookup_table`. Counts are never truncated.
    pub fn decrypt(
        &self,
        secret: &SecretKey,
        section_id: &str,
        lookup_table: &DiscreteLogTable,
    ) -> Result<DecodedSection, DecodeError> {
        if self.rows == 0 {
            return Err(DecodeError::EmptySection(section_id.to_owned()));
        }

        let mut decoded = DecodedSection::default();
        for (option, column) in self.options.iter().zip(&self.columns) {
            let count = secret.decrypt(column, lookup_table).ok_or_else(|| {
                DecodeError::LookupExhausted {
                    section: section_id.to_owned(),
                    option: option.clone(),
                    max_value: lookup_table.max_value(),
                }
            })?;
            decoded.record(option.clone(), count);
        }
        tracing::debug!(section_id, rows = self.rows, "decrypted section tally");
        Ok(decoded)
    }
}

/// Decrypts a single section into vote counts.
///
/// Rows are aligned by the canonical option order of the first row, aggregated
/// per option column, and the aggregates are decrypted with `lookup_table`.
///
/// # Errors
///
/// Returns an error if the section is empty, rows have different option sets,
/// or a count is not covered by `lookup_table`.
pub fn decrypt_section(
    secret: &SecretKey,
    section: &EncryptedSection,
    section_id: &str,
    lookup_table: &DiscreteLogTable,
) -> Result<DecodedSection, DecodeError> {
    if section.votes.is_empty() {
        return Err(DecodeError::EmptySection(section_id.to_owned()));
    }
    SectionTally::from_section(secret.params(), section)?.decrypt(secret, section_id, lookup_table)
}
