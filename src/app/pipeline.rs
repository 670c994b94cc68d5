//! Validation pipeline for submitted ballots.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::{
    ballot::{
        section_options, verify_row, EncryptedOption, EncryptedSection, FilledBallotPaper,
        OptionId, ReservedIdError,
    },
    decode::{DecodeError, DecodedSection},
    registry::RegistryError,
};
use crate::{
    config::PipelineConfig, group::GroupParams, LogEqualityProof, PublicKey, VerificationError,
};

/// Configuration of a section of a ballot paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionConfig {
    /// Number of rows a filled section must contain.
    pub max_votes: u64,
    /// Maximum number of votes for a single candidate within the section.
    pub max_votes_per_candidate: u64,
    /// Identifiers of candidates in the section.
    pub candidates: BTreeSet<String>,
}

/// Configuration of a ballot paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotPaperConfig {
    /// Identifier of the ballot paper.
    pub id: String,
    /// Identifier of the election the ballot paper belongs to.
    pub election_id: String,
    /// Maximum total number of votes for candidates across all sections.
    pub max_votes: u64,
    /// Maximum number of votes for a single candidate across all sections.
    pub max_votes_per_candidate: u64,
    /// Sections keyed by their identifiers.
    pub sections: BTreeMap<String, SectionConfig>,
}

/// Status of an election as seen by the ballot directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    /// Voting period has started.
    pub started: bool,
    /// Election configuration is frozen and keys are generated.
    pub frozen: bool,
    /// Voting period has ended.
    pub ended: bool,
}

/// Eligibility of a voter for a ballot paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterStatus {
    /// Voter may submit the ballot paper.
    Eligible,
    /// Voter is not registered for the ballot paper.
    NotRegistered,
    /// Voter has already submitted the ballot paper.
    AlreadyVoted,
}

/// Source of ballot paper configurations and election status.
pub trait BallotDirectory {
    /// Looks up a ballot paper by its identifier.
    fn ballot_paper(&self, ballot_paper_id: &str) -> Option<BallotPaperConfig>;
    /// Looks up the status of an election.
    fn election_status(&self, election_id: &str) -> Option<ElectionStatus>;
}

/// Source of voter eligibility.
pub trait VoterRegistry {
    /// Returns eligibility of `voter_id` for the specified ballot paper.
    fn voter_status(&self, voter_id: &str, ballot_paper_id: &str) -> VoterStatus;
}

/// Election keys used for validation. Implemented by [`ElectionRegistry`].
///
/// [`ElectionRegistry`]: super::ElectionRegistry
pub trait ElectionKeys {
    /// Returns the public key of a frozen election.
    fn public_key(&self, election_id: &str) -> Option<PublicKey>;

    /// Decrypts a section of a ballot using a lookup table for `0..=max_votes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not frozen or the section cannot be decoded.
    fn decrypt_section(
        &self,
        election_id: &str,
        section_id: &str,
        section: &EncryptedSection,
        max_votes: u64,
    ) -> Result<DecodedSection, RegistryError>;
}

/// Stage of the validation pipeline. Stages run in the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Ballot structure and referenced ballot paper.
    Schema,
    /// Voter eligibility.
    Eligibility,
    /// Election status.
    ElectionWindow,
    /// Set of submitted sections.
    Completeness,
    /// Rows and options of each section, and ranges of numeric components.
    SectionShape,
    /// Row proofs and per-option bit proofs.
    Proofs,
    /// Decrypted per-section counts. Counts of a section must add up to its number of rows,
    /// which together with the proofs ensures that every row is one-hot.
    SectionLimits,
    /// Aggregated counts across sections.
    BallotLimits,
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Schema => "schema",
            Self::Eligibility => "eligibility",
            Self::ElectionWindow => "election window",
            Self::Completeness => "completeness",
            Self::SectionShape => "section shape",
            Self::Proofs => "proofs",
            Self::SectionLimits => "section limits",
            Self::BallotLimits => "ballot limits",
        })
    }
}

/// Coarse kind of [`BallotRejection`] that can be disclosed to the voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// The ballot is structurally malformed.
    Malformed,
    /// The voter may not submit the ballot at this time.
    Forbidden,
    /// The ballot does not contain a valid vote.
    InvalidVote,
}

impl RejectionKind {
    /// Returns the message disclosed to the voter.
    pub fn message(self) -> &'static str {
        match self {
            Self::Malformed => "malformed ballot",
            Self::Forbidden => "forbidden",
            Self::InvalidVote => "invalid vote",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.message())
    }
}

/// Detailed reason for rejecting a ballot. Not intended to be disclosed to the voter.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RejectionCause {
    /// Ballot does not match the expected structure.
    #[error("ballot does not match the schema: {0}")]
    Schema(String),
    /// Referenced ballot paper does not exist.
    #[error("unknown ballot paper `{0}`")]
    UnknownBallotPaper(String),
    /// Voter is not registered for the ballot paper.
    #[error("voter is not registered for the ballot paper")]
    NotRegistered,
    /// Voter has already voted.
    #[error("voter has already voted")]
    AlreadyVoted,
    /// Election of the ballot paper does not exist.
    #[error("unknown election `{0}`")]
    UnknownElection(String),
    /// Voting period has not started.
    #[error("election has not started")]
    ElectionNotStarted,
    /// Election is not frozen, or its keys are unavailable.
    #[error("election is not frozen")]
    ElectionNotFrozen,
    /// Voting period has ended.
    #[error("election has ended")]
    ElectionEnded,
    /// Number of submitted sections differs from the configuration.
    #[error("ballot has {actual} sections, expected {expected}")]
    SectionCountMismatch {
        /// Configured number of sections.
        expected: usize,
        /// Submitted number of sections.
        actual: usize,
    },
    /// Submitted section is not configured.
    #[error("unknown section `{0}`")]
    UnknownSection(String),
    /// Number of rows in a section differs from the configuration.
    #[error("section `{section}` has {actual} rows, expected {expected}")]
    RowCountMismatch {
        /// Section identifier.
        section: String,
        /// Configured number of rows.
        expected: u64,
        /// Submitted number of rows.
        actual: usize,
    },
    /// Configured candidate id collides with a reserved option id.
    #[error("section `{section}` is misconfigured: {source}")]
    ReservedCandidateId {
        /// Section identifier.
        section: String,
        /// Collision details.
        #[source]
        source: ReservedIdError,
    },
    /// Options of a row differ from the configured options.
    #[error("row #{row} of section `{section}` has unexpected options")]
    OptionSetMismatch {
        /// Section identifier.
        section: String,
        /// Zero-based row index.
        row: usize,
    },
    /// A numeric component of an option is out of range for the election group.
    #[error("option `{option}` in row #{row} of section `{section}` has out-of-range components")]
    ComponentOutOfRange {
        /// Section identifier.
        section: String,
        /// Zero-based row index.
        row: usize,
        /// Offending option.
        option: OptionId,
    },
    /// Row proof does not verify.
    #[error("proof for row #{row} of section `{section}` is invalid: {source}")]
    InvalidProof {
        /// Section identifier.
        section: String,
        /// Zero-based row index.
        row: usize,
        /// Verification error.
        #[source]
        source: VerificationError,
    },
    /// Section could not be decrypted.
    #[error("cannot decrypt section `{section}`: {source}")]
    Decryption {
        /// Section identifier.
        section: String,
        /// Decryption error.
        #[source]
        source: RegistryError,
    },
    /// Decrypted counts of a section do not add up to its number of rows, i.e.,
    /// some rows have several options set.
    #[error("section `{section}` has {votes} decrypted votes for {rows} rows")]
    SectionVoteCountMismatch {
        /// Section identifier.
        section: String,
        /// Sum of all decrypted counts, including `noVote` and `invalid`.
        votes: u64,
        /// Total number of rows.
        rows: u64,
    },
    /// Section is partially invalidated.
    #[error("section `{section}` has {invalid_count} invalid rows out of {rows}")]
    SectionInvalidCount {
        /// Section identifier.
        section: String,
        /// Number of invalidated rows.
        invalid_count: u64,
        /// Total number of rows.
        rows: u64,
    },
    /// Candidate exceeds the per-section vote limit.
    #[error("candidate `{candidate}` has {votes} votes in section `{section}`, limit is {limit}")]
    SectionCandidateLimit {
        /// Section identifier.
        section: String,
        /// Candidate identifier.
        candidate: String,
        /// Number of votes for the candidate.
        votes: u64,
        /// Configured limit.
        limit: u64,
    },
    /// Ballot is partially invalidated.
    #[error("ballot has {invalid_count} invalid rows out of {rows}")]
    BallotInvalidCount {
        /// Number of invalidated rows.
        invalid_count: u64,
        /// Total number of rows.
        rows: u64,
    },
    /// Candidate exceeds the ballot-level vote limit.
    #[error("candidate `{candidate}` has {votes} votes, limit is {limit}")]
    BallotCandidateLimit {
        /// Candidate identifier.
        candidate: String,
        /// Number of votes for the candidate.
        votes: u64,
        /// Configured limit.
        limit: u64,
    },
    /// Total number of votes for candidates exceeds the ballot-level limit.
    #[error("ballot has {votes} votes for candidates, limit is {limit}")]
    BallotVoteLimit {
        /// Number of votes for candidates.
        votes: u64,
        /// Configured limit.
        limit: u64,
    },
}

impl RejectionCause {
    /// Returns the coarse kind of this cause.
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::Schema(_) | Self::UnknownBallotPaper(_) | Self::ComponentOutOfRange { .. } => {
                RejectionKind::Malformed
            }
            Self::NotRegistered
            | Self::AlreadyVoted
            | Self::UnknownElection(_)
            | Self::ElectionNotStarted
            | Self::ElectionNotFrozen
            | Self::ElectionEnded
            | Self::Decryption {
                source: RegistryError::NotFrozen,
                ..
            } => RejectionKind::Forbidden,
            _ => RejectionKind::InvalidVote,
        }
    }

    fn is_lookup_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::Decryption {
                source: RegistryError::Decode(DecodeError::LookupExhausted { .. }),
                ..
            }
        )
    }
}

/// Rejection of a submitted ballot.
///
/// The [`Display`](fmt::Display) implementation only outputs the coarse message
/// (`malformed ballot`, `forbidden` or `invalid vote`); the detailed cause is available
/// via [`Self::cause()`] and as the error source.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct BallotRejection {
    stage: Stage,
    kind: RejectionKind,
    #[source]
    cause: RejectionCause,
}

impl BallotRejection {
    fn new(stage: Stage, cause: RejectionCause) -> Self {
        Self {
            stage,
            kind: cause.kind(),
            cause,
        }
    }

    /// Returns the stage at which the ballot was rejected.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the coarse kind of this rejection.
    pub fn kind(&self) -> RejectionKind {
        self.kind
    }

    /// Returns the detailed cause of this rejection.
    pub fn cause(&self) -> &RejectionCause {
        &self.cause
    }
}

/// Decoded totals of an accepted ballot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotTotals {
    /// Decoded counts per section.
    pub sections: BTreeMap<String, DecodedSection>,
    /// Votes per candidate across all sections.
    pub candidate_totals: BTreeMap<String, u64>,
    /// Abstentions across all sections.
    pub no_vote_count: u64,
    /// Invalidated rows across all sections.
    pub invalid_count: u64,
    /// Total number of rows across all sections.
    pub rows: u64,
}

/// Ballot that passed all validation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBallot {
    /// Identifier of the election.
    pub election_id: String,
    /// Submitted encrypted ballot.
    pub ballot: FilledBallotPaper,
    /// Decoded totals.
    pub totals: BallotTotals,
}

/// Validation pipeline for submitted ballots.
///
/// The pipeline runs [`Stage`]s strictly in order and stops at the first failing stage.
/// In particular, an ineligible voter or a structurally invalid ballot never reaches
/// decryption. Accepting a ballot has no side effects; recording the vote is up to
/// the caller.
pub struct ValidationPipeline<'a, D: ?Sized, V: ?Sized, K: ?Sized> {
    directory: &'a D,
    voters: &'a V,
    keys: &'a K,
    config: PipelineConfig,
}

impl<D: ?Sized, V: ?Sized, K: ?Sized> fmt::Debug for ValidationPipeline<'_, D, V, K> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ValidationPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a, D, V, K> ValidationPipeline<'a, D, V, K>
where
    D: BallotDirectory + ?Sized,
    V: VoterRegistry + ?Sized,
    K: ElectionKeys + ?Sized,
{
    /// Creates a pipeline with the default configuration.
    pub fn new(directory: &'a D, voters: &'a V, keys: &'a K) -> Self {
        Self {
            directory,
            voters,
            keys,
            config: PipelineConfig::default(),
        }
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parses a ballot from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the JSON does not match the ballot schema or if validation fails.
    pub fn validate_json(
        &self,
        voter_id: &str,
        json: &str,
    ) -> Result<AcceptedBallot, BallotRejection> {
        let ballot: FilledBallotPaper = serde_json::from_str(json).map_err(|err| {
            let rejection =
                BallotRejection::new(Stage::Schema, RejectionCause::Schema(err.to_string()));
            log_rejection(&rejection);
            rejection
        })?;
        self.validate(voter_id, ballot)
    }

    /// Validates a parsed ballot submitted by `voter_id`.
    ///
    /// # Errors
    ///
    /// Returns a rejection describing the first failed stage.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(voter_id = %voter_id, ballot_paper_id = %ballot.ballot_paper_id)
    )]
    pub fn validate(
        &self,
        voter_id: &str,
        ballot: FilledBallotPaper,
    ) -> Result<AcceptedBallot, BallotRejection> {
        match self.run_stages(voter_id, &ballot) {
            Ok((election_id, totals)) => {
                tracing::info!(election_id, rows = totals.rows, "ballot accepted");
                Ok(AcceptedBallot {
                    election_id,
                    ballot,
                    totals,
                })
            }
            Err(rejection) => {
                log_rejection(&rejection);
                Err(rejection)
            }
        }
    }

    fn run_stages(
        &self,
        voter_id: &str,
        ballot: &FilledBallotPaper,
    ) -> Result<(String, BallotTotals), BallotRejection> {
        let at = |stage: Stage| move |cause: RejectionCause| BallotRejection::new(stage, cause);

        let paper = self.check_schema(ballot).map_err(at(Stage::Schema))?;
        self.check_eligibility(voter_id, &paper)
            .map_err(at(Stage::Eligibility))?;
        let key = self
            .check_election_window(&paper)
            .map_err(at(Stage::ElectionWindow))?;
        check_completeness(&paper, ballot).map_err(at(Stage::Completeness))?;
        check_section_shape(&paper, key.params(), ballot).map_err(at(Stage::SectionShape))?;
        if self.config.verify_proofs {
            check_proofs(&key, ballot).map_err(at(Stage::Proofs))?;
        }
        let sections = self
            .check_section_limits(&paper, ballot)
            .map_err(at(Stage::SectionLimits))?;
        let totals = check_ballot_limits(&paper, sections).map_err(at(Stage::BallotLimits))?;
        Ok((paper.election_id, totals))
    }

    fn check_schema(&self, ballot: &FilledBallotPaper) -> Result<BallotPaperConfig, RejectionCause> {
        if ballot.ballot_paper_id.is_empty() {
            return Err(RejectionCause::Schema("empty ballot paper id".to_owned()));
        }
        if ballot.sections.keys().any(String::is_empty) {
            return Err(RejectionCause::Schema("empty section id".to_owned()));
        }
        self.directory
            .ballot_paper(&ballot.ballot_paper_id)
            .ok_or_else(|| RejectionCause::UnknownBallotPaper(ballot.ballot_paper_id.clone()))
    }

    fn check_eligibility(
        &self,
        voter_id: &str,
        paper: &BallotPaperConfig,
    ) -> Result<(), RejectionCause> {
        match self.voters.voter_status(voter_id, &paper.id) {
            VoterStatus::Eligible => Ok(()),
            VoterStatus::NotRegistered => Err(RejectionCause::NotRegistered),
            VoterStatus::AlreadyVoted => Err(RejectionCause::AlreadyVoted),
        }
    }

    fn check_election_window(&self, paper: &BallotPaperConfig) -> Result<PublicKey, RejectionCause> {
        let status = self
            .directory
            .election_status(&paper.election_id)
            .ok_or_else(|| RejectionCause::UnknownElection(paper.election_id.clone()))?;
        if !status.started {
            return Err(RejectionCause::ElectionNotStarted);
        }
        if !status.frozen {
            return Err(RejectionCause::ElectionNotFrozen);
        }
        if status.ended && !self.config.accept_after_end {
            return Err(RejectionCause::ElectionEnded);
        }
        self.keys
            .public_key(&paper.election_id)
            .ok_or(RejectionCause::ElectionNotFrozen)
    }

    fn check_section_limits(
        &self,
        paper: &BallotPaperConfig,
        ballot: &FilledBallotPaper,
    ) -> Result<BTreeMap<String, DecodedSection>, RejectionCause> {
        let mut decoded_sections = BTreeMap::new();
        for (section_id, section) in &ballot.sections {
            let config = section_config(paper, section_id)?;
            let decoded = self
                .keys
                .decrypt_section(&paper.election_id, section_id, section, config.max_votes)
                .map_err(|source| RejectionCause::Decryption {
                    section: section_id.clone(),
                    source,
                })?;

            let rows = section.votes.len() as u64;
            let votes = decoded.candidate_votes() + decoded.no_vote_count + decoded.invalid_count;
            if votes != rows {
                return Err(RejectionCause::SectionVoteCountMismatch {
                    section: section_id.clone(),
                    votes,
                    rows,
                });
            }
            if decoded.invalid_count != 0 && decoded.invalid_count != rows {
                return Err(RejectionCause::SectionInvalidCount {
                    section: section_id.clone(),
                    invalid_count: decoded.invalid_count,
                    rows,
                });
            }
            for (candidate, &votes) in &decoded.candidate_results {
                if votes > config.max_votes_per_candidate {
                    return Err(RejectionCause::SectionCandidateLimit {
                        section: section_id.clone(),
                        candidate: candidate.clone(),
                        votes,
                        limit: config.max_votes_per_candidate,
                    });
                }
            }
            decoded_sections.insert(section_id.clone(), decoded);
        }
        Ok(decoded_sections)
    }
}

fn log_rejection(rejection: &BallotRejection) {
    let stage = rejection.stage();
    let cause = rejection.cause();
    if cause.is_lookup_exhaustion() {
        tracing::error!(%stage, %cause, "ballot rejected: decrypted count is out of lookup table bounds");
    } else {
        tracing::debug!(%stage, %cause, kind = %rejection.kind(), "ballot rejected");
    }
}

fn section_config<'p>(
    paper: &'p BallotPaperConfig,
    section_id: &str,
) -> Result<&'p SectionConfig, RejectionCause> {
    paper
        .sections
        .get(section_id)
        .ok_or_else(|| RejectionCause::UnknownSection(section_id.to_owned()))
}

fn check_completeness(
    paper: &BallotPaperConfig,
    ballot: &FilledBallotPaper,
) -> Result<(), RejectionCause> {
    if ballot.sections.len() != paper.sections.len() {
        return Err(RejectionCause::SectionCountMismatch {
            expected: paper.sections.len(),
            actual: ballot.sections.len(),
        });
    }
    for section_id in ballot.sections.keys() {
        section_config(paper, section_id)?;
    }
    Ok(())
}

fn check_section_shape(
    paper: &BallotPaperConfig,
    params: &GroupParams,
    ballot: &FilledBallotPaper,
) -> Result<(), RejectionCause> {
    for (section_id, section) in &ballot.sections {
        let config = section_config(paper, section_id)?;
        if section.votes.len() as u64 != config.max_votes {
            return Err(RejectionCause::RowCountMismatch {
                section: section_id.clone(),
                expected: config.max_votes,
                actual: section.votes.len(),
            });
        }

        let options = section_options(&config.candidates).map_err(|source| {
            RejectionCause::ReservedCandidateId {
                section: section_id.clone(),
                source,
            }
        })?;
        for (i, row) in section.votes.iter().enumerate() {
            if !row.option_ids().eq(&options) {
                return Err(RejectionCause::OptionSetMismatch {
                    section: section_id.clone(),
                    row: i,
                });
            }
            if let Some((option, _)) = row
                .iter()
                .find(|(_, encrypted)| !components_in_range(params, encrypted))
            {
                return Err(RejectionCause::ComponentOutOfRange {
                    section: section_id.clone(),
                    row: i,
                    option: option.clone(),
                });
            }
        }
    }
    Ok(())
}

fn components_in_range(params: &GroupParams, option: &EncryptedOption) -> bool {
    let is_element = |value: &BigUint| value < params.modulus();
    let proof_in_range = |proof: &LogEqualityProof| {
        let (first_commitment, second_commitment) = proof.commitments();
        is_element(first_commitment)
            && is_element(second_commitment)
            && params.is_scalar(proof.challenge())
            && params.is_scalar(proof.response())
    };

    let ciphertext = option.ciphertext();
    is_element(ciphertext.alpha())
        && is_element(ciphertext.beta())
        && proof_in_range(option.proof())
        && option.bit_proof().branches().iter().all(proof_in_range)
}

fn check_proofs(key: &PublicKey, ballot: &FilledBallotPaper) -> Result<(), RejectionCause> {
    for (section_id, section) in &ballot.sections {
        for (i, row) in section.votes.iter().enumerate() {
            verify_row(key, row).map_err(|source| RejectionCause::InvalidProof {
                section: section_id.clone(),
                row: i,
                source,
            })?;
        }
    }
    Ok(())
}

fn check_ballot_limits(
    paper: &BallotPaperConfig,
    sections: BTreeMap<String, DecodedSection>,
) -> Result<BallotTotals, RejectionCause> {
    let mut totals = BallotTotals::default();
    for (section_id, decoded) in &sections {
        for (candidate, &votes) in &decoded.candidate_results {
            *totals.candidate_totals.entry(candidate.clone()).or_default() += votes;
        }
        totals.no_vote_count += decoded.no_vote_count;
        totals.invalid_count += decoded.invalid_count;
        totals.rows += section_config(paper, section_id)?.max_votes;
    }

    if totals.invalid_count != 0 && totals.invalid_count != totals.rows {
        return Err(RejectionCause::BallotInvalidCount {
            invalid_count: totals.invalid_count,
            rows: totals.rows,
        });
    }
    for (candidate, &votes) in &totals.candidate_totals {
        if votes > paper.max_votes_per_candidate {
            return Err(RejectionCause::BallotCandidateLimit {
                candidate: candidate.clone(),
                votes,
                limit: paper.max_votes_per_candidate,
            });
        }
    }
    let votes: u64 = totals.candidate_totals.values().sum();
    if votes > paper.max_votes {
        return Err(RejectionCause::BallotVoteLimit {
            votes,
            limit: paper.max_votes,
        });
    }

    totals.sections = sections;
    Ok(totals)
}
