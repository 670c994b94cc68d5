//! End-to-end tests for the ballot validation pipeline.

use rand::thread_rng;

use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use crate::test_params;
use evote_elgamal::{
    app::{
        section_options, verify_row, BallotDirectory, BallotEncoder, BallotPaperConfig,
        BallotRejection, DecodeError, DecodedSection, ElectionKeys, ElectionRegistry,
        ElectionStatus, EncryptedOption, EncryptedRow, EncryptedSection, FilledBallotPaper,
        OptionId, PlainRow, RegistryError, RejectionCause, RejectionKind, SectionConfig, Stage,
        ValidationPipeline, VoterRegistry, VoterStatus,
    },
    config::{KeyConfig, PipelineConfig},
    Ciphertext, PublicKey,
};

const ELECTION_ID: &str = "election";
const PAPER_ID: &str = "paper";
const VOTER_ID: &str = "voter";

#[derive(Debug)]
struct Directory {
    papers: HashMap<String, BallotPaperConfig>,
    status: ElectionStatus,
}

impl BallotDirectory for Directory {
    fn ballot_paper(&self, ballot_paper_id: &str) -> Option<BallotPaperConfig> {
        self.papers.get(ballot_paper_id).cloned()
    }

    fn election_status(&self, election_id: &str) -> Option<ElectionStatus> {
        (election_id == ELECTION_ID).then_some(self.status)
    }
}

#[derive(Debug)]
struct Voters {
    status: VoterStatus,
    calls: Cell<usize>,
}

impl VoterRegistry for Voters {
    fn voter_status(&self, voter_id: &str, ballot_paper_id: &str) -> VoterStatus {
        self.calls.set(self.calls.get() + 1);
        if voter_id == VOTER_ID && ballot_paper_id == PAPER_ID {
            self.status
        } else {
            VoterStatus::NotRegistered
        }
    }
}

/// Election keys that count calls to the wrapped registry.
#[derive(Debug)]
struct CountingKeys {
    registry: ElectionRegistry,
    key_calls: Cell<usize>,
    decrypt_calls: Cell<usize>,
}

impl ElectionKeys for CountingKeys {
    fn public_key(&self, election_id: &str) -> Option<PublicKey> {
        self.key_calls.set(self.key_calls.get() + 1);
        self.registry.public_key(election_id)
    }

    fn decrypt_section(
        &self,
        election_id: &str,
        section_id: &str,
        section: &EncryptedSection,
        max_votes: u64,
    ) -> Result<DecodedSection, RegistryError> {
        self.decrypt_calls.set(self.decrypt_calls.get() + 1);
        self.registry
            .decrypt_section(election_id, section_id, section, max_votes)
    }
}

#[derive(Debug)]
struct Election {
    directory: Directory,
    voters: Voters,
    keys: CountingKeys,
    key: PublicKey,
    config: PipelineConfig,
}

impl Election {
    fn new(paper: BallotPaperConfig) -> Self {
        let registry = ElectionRegistry::new(KeyConfig::default());
        let key = registry
            .freeze_with_group(ELECTION_ID, &test_params(), &mut thread_rng())
            .unwrap();
        Self {
            directory: Directory {
                papers: [(paper.id.clone(), paper)].into_iter().collect(),
                status: ElectionStatus {
                    started: true,
                    frozen: true,
                    ended: false,
                },
            },
            voters: Voters {
                status: VoterStatus::Eligible,
                calls: Cell::new(0),
            },
            keys: CountingKeys {
                registry,
                key_calls: Cell::new(0),
                decrypt_calls: Cell::new(0),
            },
            key,
            config: PipelineConfig::default(),
        }
    }

    fn paper(&self) -> &BallotPaperConfig {
        &self.directory.papers[PAPER_ID]
    }

    /// Encrypts a ballot; each section is specified by its id and per-row choices.
    fn encrypt(&self, sections: &[(&str, &[&str])]) -> FilledBallotPaper {
        let mut rng = thread_rng();
        let encoder = BallotEncoder::new(&self.key);
        let sections = sections
            .iter()
            .map(|&(section_id, choices)| {
                let candidates = &self.paper().sections[section_id].candidates;
                let section = encrypt_section(&encoder, candidates.iter(), choices);
                (section_id.to_owned(), section)
            })
            .collect();
        FilledBallotPaper {
            ballot_paper_id: PAPER_ID.to_owned(),
            sections,
        }
    }

    fn validate(&self, ballot: FilledBallotPaper) -> Result<BTreeMap<String, u64>, BallotRejection> {
        let pipeline = ValidationPipeline::new(&self.directory, &self.voters, &self.keys)
            .with_config(self.config.clone());
        let accepted = pipeline.validate(VOTER_ID, ballot)?;
        assert_eq!(accepted.election_id, ELECTION_ID);
        Ok(accepted.totals.candidate_totals)
    }

    fn decrypt_calls(&self) -> usize {
        self.keys.decrypt_calls.get()
    }
}

fn encrypt_section<'a>(
    encoder: &BallotEncoder<'_>,
    candidates: impl Iterator<Item = &'a String>,
    choices: &[&str],
) -> EncryptedSection {
    let options = section_options(candidates).unwrap();
    let rows: Vec<_> = choices
        .iter()
        .map(|&choice| PlainRow::one_hot(&options, &choice.parse().unwrap()).unwrap())
        .collect();
    encoder
        .encrypt_section(&rows, &mut (), &mut thread_rng())
        .unwrap()
}

fn section(max_votes: u64, max_votes_per_candidate: u64, candidates: &[&str]) -> SectionConfig {
    SectionConfig {
        max_votes,
        max_votes_per_candidate,
        candidates: candidates.iter().map(|&id| id.to_owned()).collect(),
    }
}

fn paper(
    max_votes: u64,
    max_votes_per_candidate: u64,
    sections: Vec<(&str, SectionConfig)>,
) -> BallotPaperConfig {
    BallotPaperConfig {
        id: PAPER_ID.to_owned(),
        election_id: ELECTION_ID.to_owned(),
        max_votes,
        max_votes_per_candidate,
        sections: sections
            .into_iter()
            .map(|(id, section)| (id.to_owned(), section))
            .collect(),
    }
}

fn single_section_election() -> Election {
    Election::new(paper(4, 4, vec![("main", section(4, 4, &["A", "B"]))]))
}

fn assert_rejected(
    result: Result<BTreeMap<String, u64>, BallotRejection>,
    stage: Stage,
    kind: RejectionKind,
) -> BallotRejection {
    let rejection = result.unwrap_err();
    assert_eq!(rejection.stage(), stage, "{:?}", rejection.cause());
    assert_eq!(rejection.kind(), kind);
    assert_eq!(rejection.to_string(), kind.message());
    rejection
}

#[test]
fn valid_ballot_is_accepted() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
    let totals = election.validate(ballot).unwrap();
    assert_eq!(totals["A"], 2);
    assert_eq!(totals["B"], 1);
    assert_eq!(election.decrypt_calls(), 1);
}

#[test]
fn valid_json_ballot_is_accepted() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["B", "B", "B", "noVote"])]);
    let json = serde_json::to_string(&ballot).unwrap();

    let pipeline = ValidationPipeline::new(&election.directory, &election.voters, &election.keys);
    let accepted = pipeline.validate_json(VOTER_ID, &json).unwrap();
    assert_eq!(accepted.ballot, ballot);
    assert_eq!(accepted.totals.candidate_totals["B"], 3);
    assert_eq!(accepted.totals.no_vote_count, 1);
    assert_eq!(accepted.totals.rows, 4);
    let main = &accepted.totals.sections["main"];
    assert_eq!(main.candidate_results["A"], 0);
}

#[test]
fn partially_invalidated_section_is_rejected() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["A", "A", "noVote", "invalid"])]);
    let rejection = assert_rejected(
        election.validate(ballot),
        Stage::SectionLimits,
        RejectionKind::InvalidVote,
    );
    assert!(matches!(
        rejection.cause(),
        RejectionCause::SectionInvalidCount { invalid_count: 1, rows: 4, .. }
    ));
}

#[test]
fn fully_invalidated_section_is_accepted() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["invalid"; 4])]);
    let pipeline = ValidationPipeline::new(&election.directory, &election.voters, &election.keys);
    let accepted = pipeline.validate(VOTER_ID, ballot).unwrap();
    assert_eq!(accepted.totals.invalid_count, 4);
    assert_eq!(accepted.totals.sections["main"].invalid_count, 4);
    assert!(accepted.totals.candidate_totals.values().all(|&votes| votes == 0));
}

#[test]
fn ballot_level_candidate_limit() {
    let sections = vec![
        ("first", section(2, 2, &["A", "B"])),
        ("second", section(2, 2, &["A", "B"])),
    ];
    let election = Election::new(paper(5, 3, sections));
    let ballot = election.encrypt(&[("first", &["A", "A"]), ("second", &["A", "A"])]);
    let rejection = assert_rejected(
        election.validate(ballot),
        Stage::BallotLimits,
        RejectionKind::InvalidVote,
    );
    assert!(matches!(
        rejection.cause(),
        RejectionCause::BallotCandidateLimit { votes: 4, limit: 3, .. }
    ));

    let ballot = election.encrypt(&[("first", &["A", "B"]), ("second", &["A", "noVote"])]);
    let totals = election.validate(ballot).unwrap();
    assert_eq!(totals["A"], 2);
    assert_eq!(totals["B"], 1);
}

#[test]
fn ballot_level_vote_limit() {
    let sections = vec![
        ("first", section(2, 2, &["A", "B"])),
        ("second", section(2, 2, &["C"])),
    ];
    let election = Election::new(paper(3, 3, sections));
    let ballot = election.encrypt(&[("first", &["A", "B"]), ("second", &["C", "C"])]);
    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::BallotLimits);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::BallotVoteLimit { votes: 4, limit: 3 }
    ));
}

#[test]
fn section_level_candidate_limit() {
    let election = Election::new(paper(4, 4, vec![("main", section(2, 1, &["A", "B"]))]));
    let ballot = election.encrypt(&[("main", &["A", "A"])]);
    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::SectionLimits);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::SectionCandidateLimit { votes: 2, limit: 1, .. }
    ));
}

fn tamper_alpha(ballot: &mut FilledBallotPaper) {
    let params = test_params();
    let row = &mut ballot.sections.get_mut("main").unwrap().votes[0];
    let option = OptionId::Candidate("A".to_owned());
    let original = row.get(&option).unwrap().clone();
    let ciphertext = Ciphertext::new(
        params.random_residue(&mut thread_rng()),
        original.ciphertext().beta().clone(),
    );
    row.insert(
        option,
        EncryptedOption::new(ciphertext, original.proof().clone(), original.bit_proof().clone()),
    );
}

/// Encrypts a row where every option from `chosen` is set to 1. Each option is a valid bit,
/// so all row and bit proofs verify.
fn encrypt_multi_hot_row(
    encoder: &BallotEncoder<'_>,
    key: &PublicKey,
    options: &BTreeSet<OptionId>,
    chosen: &[OptionId],
) -> EncryptedRow {
    let mut rng = thread_rng();
    let params = key.params();
    let bits: Vec<bool> = options.iter().map(|option| chosen.contains(option)).collect();
    let randomness = params.random_residue(&mut rng);
    let ciphertexts: Vec<Ciphertext> = bits
        .iter()
        .map(|&bit| {
            let plaintext = params.encode(u64::from(bit));
            key.encrypt_element(&plaintext, Some(&randomness), &mut rng)
                .unwrap()
                .into()
        })
        .collect();
    let real_index = bits.iter().position(|&bit| bit).unwrap();
    let proof = encoder.prove_row(&ciphertexts, real_index, &randomness, &mut rng);

    let mut row = EncryptedRow::default();
    for (((option, ciphertext), branch), bit) in
        options.iter().zip(&ciphertexts).zip(proof.into_branches()).zip(bits)
    {
        let bit_proof = encoder.prove_bit(option, ciphertext, bit, &randomness, &mut rng);
        row.insert(
            option.clone(),
            EncryptedOption::new(ciphertext.clone(), branch, bit_proof),
        );
    }
    row
}

#[test]
fn rows_with_several_chosen_options_are_rejected() {
    let election = single_section_election();
    let encoder = BallotEncoder::new(&election.key);
    let options = section_options(&election.paper().sections["main"].candidates).unwrap();

    // Every row both votes for `A` and invalidates itself. This passes the all-or-nothing
    // invalidation rule, but would add votes for `A`.
    let chosen = [OptionId::Candidate("A".to_owned()), OptionId::Invalid];
    let votes: Vec<_> = (0..4)
        .map(|_| encrypt_multi_hot_row(&encoder, &election.key, &options, &chosen))
        .collect();
    for row in &votes {
        verify_row(&election.key, row).unwrap();
    }
    let ballot = FilledBallotPaper {
        ballot_paper_id: PAPER_ID.to_owned(),
        sections: [("main".to_owned(), EncryptedSection { votes })]
            .into_iter()
            .collect(),
    };

    let rejection = assert_rejected(
        election.validate(ballot),
        Stage::SectionLimits,
        RejectionKind::InvalidVote,
    );
    assert!(matches!(
        rejection.cause(),
        RejectionCause::SectionVoteCountMismatch { votes: 8, rows: 4, .. }
    ));
    assert_eq!(election.decrypt_calls(), 1);
}

#[test]
fn rows_with_non_bit_options_are_rejected_by_proof_check() {
    let election = single_section_election();
    let encoder = BallotEncoder::new(&election.key);
    let mut ballot = election.encrypt(&[("main", &["A", "B", "B", "noVote"])]);

    // Replace the first row with a row where `A` encrypts 1 and `B` encrypts 2.
    let mut rng = thread_rng();
    let params = election.key.params();
    let options = section_options(&election.paper().sections["main"].candidates).unwrap();
    let randomness = params.random_residue(&mut rng);
    let plaintexts = [params.encode(1), params.encode(2), params.encode(0), params.encode(0)];
    let ciphertexts: Vec<Ciphertext> = plaintexts
        .iter()
        .map(|plaintext| {
            election
                .key
                .encrypt_element(plaintext, Some(&randomness), &mut rng)
                .unwrap()
                .into()
        })
        .collect();
    let proof = encoder.prove_row(&ciphertexts, 0, &randomness, &mut rng);
    let mut row = EncryptedRow::default();
    for (i, ((option, ciphertext), branch)) in options
        .iter()
        .zip(&ciphertexts)
        .zip(proof.into_branches())
        .enumerate()
    {
        let bit_proof = encoder.prove_bit(option, ciphertext, i == 0, &randomness, &mut rng);
        row.insert(
            option.clone(),
            EncryptedOption::new(ciphertext.clone(), branch, bit_proof),
        );
    }
    ballot.sections.get_mut("main").unwrap().votes[0] = row;

    let rejection = assert_rejected(
        election.validate(ballot),
        Stage::Proofs,
        RejectionKind::InvalidVote,
    );
    assert!(matches!(
        rejection.cause(),
        RejectionCause::InvalidProof { row: 0, .. }
    ));
    assert_eq!(election.decrypt_calls(), 0);
}

#[test]
fn tampered_ciphertext_is_rejected_by_proof_check() {
    let election = single_section_election();
    let mut ballot = election.encrypt(&[("main", &["A", "B", "B", "noVote"])]);
    tamper_alpha(&mut ballot);

    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::Proofs);
    assert_eq!(rejection.kind(), RejectionKind::InvalidVote);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::InvalidProof { row: 0, .. }
    ));
    assert_eq!(election.decrypt_calls(), 0);
}

#[test]
fn tampered_ciphertext_is_rejected_by_decryption() {
    let mut election = single_section_election();
    election.config.verify_proofs = false;
    let mut ballot = election.encrypt(&[("main", &["A", "B", "B", "noVote"])]);
    tamper_alpha(&mut ballot);

    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::SectionLimits);
    assert_eq!(rejection.kind(), RejectionKind::InvalidVote);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::Decryption {
            source: RegistryError::Decode(DecodeError::LookupExhausted { .. }),
            ..
        }
    ));
    assert_eq!(election.decrypt_calls(), 1);
}

#[test]
fn unknown_candidate_is_rejected_before_decryption() {
    let election = single_section_election();
    let encoder = BallotEncoder::new(&election.key);
    let candidates = ["A".to_owned(), "B".to_owned(), "C".to_owned()];
    let section = encrypt_section(&encoder, candidates.iter(), &["C", "A", "noVote", "A"]);
    let ballot = FilledBallotPaper {
        ballot_paper_id: PAPER_ID.to_owned(),
        sections: [("main".to_owned(), section)].into_iter().collect(),
    };

    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::SectionShape);
    assert_eq!(rejection.kind(), RejectionKind::InvalidVote);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::OptionSetMismatch { row: 0, .. }
    ));
    assert_eq!(election.decrypt_calls(), 0);
}

#[test]
fn ineligible_voters_never_reach_decryption() {
    for status in [VoterStatus::NotRegistered, VoterStatus::AlreadyVoted] {
        let mut election = single_section_election();
        election.voters.status = status;
        let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);

        let rejection = election.validate(ballot).unwrap_err();
        assert_eq!(rejection.stage(), Stage::Eligibility);
        assert_eq!(rejection.to_string(), "forbidden");
        assert_eq!(election.voters.calls.get(), 1);
        assert_eq!(election.keys.key_calls.get(), 0);
        assert_eq!(election.decrypt_calls(), 0);
    }
}

#[test]
fn election_window_is_enforced() {
    let closed_statuses = [
        (false, true, false),
        (true, false, false),
        (true, true, true),
    ];
    for (started, frozen, ended) in closed_statuses {
        let mut election = single_section_election();
        election.directory.status = ElectionStatus {
            started,
            frozen,
            ended,
        };
        let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
        let rejection = election.validate(ballot).unwrap_err();
        assert_eq!(rejection.stage(), Stage::ElectionWindow);
        assert_eq!(rejection.kind(), RejectionKind::Forbidden);
        assert_eq!(election.decrypt_calls(), 0);
    }

    // Late ballots may be accepted if configured so.
    let mut election = single_section_election();
    election.directory.status.ended = true;
    election.config.accept_after_end = true;
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
    election.validate(ballot).unwrap();
}

#[test]
fn unfrozen_keys_are_forbidden() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
    election.keys.registry.unfreeze(ELECTION_ID).unwrap();

    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::ElectionWindow);
    assert!(matches!(rejection.cause(), RejectionCause::ElectionNotFrozen));
    assert_eq!(rejection.to_string(), "forbidden");
}

#[test]
fn malformed_json_is_rejected() {
    let election = single_section_election();
    let pipeline = ValidationPipeline::new(&election.directory, &election.voters, &election.keys);
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
    let mut json = serde_json::to_value(&ballot).unwrap();
    json["sections"]["main"]["votes"][0]["A"]["alpha"] = serde_json::json!(1.5);

    let rejection = pipeline
        .validate_json(VOTER_ID, &json.to_string())
        .unwrap_err();
    assert_eq!(rejection.stage(), Stage::Schema);
    assert_eq!(rejection.to_string(), "malformed ballot");
    assert_eq!(election.voters.calls.get(), 0);

    let rejection = pipeline.validate_json(VOTER_ID, "[]").unwrap_err();
    assert_eq!(rejection.kind(), RejectionKind::Malformed);

    let mut unknown_paper = ballot;
    unknown_paper.ballot_paper_id = "other".to_owned();
    let rejection = pipeline.validate(VOTER_ID, unknown_paper).unwrap_err();
    assert_eq!(rejection.stage(), Stage::Schema);
    assert!(matches!(rejection.cause(), RejectionCause::UnknownBallotPaper(_)));
}

#[test]
fn out_of_range_components_are_malformed() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote", "A"])]);
    let mut json = serde_json::to_value(&ballot).unwrap();
    let modulus = test_params().modulus().to_string();
    json["sections"]["main"]["votes"][2]["B"]["beta"] = modulus.into();

    let pipeline = ValidationPipeline::new(&election.directory, &election.voters, &election.keys);
    let rejection = pipeline
        .validate_json(VOTER_ID, &json.to_string())
        .unwrap_err();
    assert_eq!(rejection.stage(), Stage::SectionShape);
    assert_eq!(rejection.kind(), RejectionKind::Malformed);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::ComponentOutOfRange { row: 2, .. }
    ));
}

#[test]
fn incomplete_ballots_are_rejected() {
    let sections = vec![
        ("first", section(1, 1, &["A"])),
        ("second", section(1, 1, &["A"])),
    ];
    let election = Election::new(paper(2, 2, sections));
    let ballot = election.encrypt(&[("first", &["A"])]);
    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::Completeness);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::SectionCountMismatch {
            expected: 2,
            actual: 1
        }
    ));

    let mut ballot = election.encrypt(&[("first", &["A"]), ("second", &["A"])]);
    let section = ballot.sections.remove("second").unwrap();
    ballot.sections.insert("third".to_owned(), section);
    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::Completeness);
    assert_eq!(rejection.kind(), RejectionKind::InvalidVote);
}

#[test]
fn row_count_must_match_section_config() {
    let election = single_section_election();
    let ballot = election.encrypt(&[("main", &["A", "B", "noVote"])]);
    let rejection = election.validate(ballot).unwrap_err();
    assert_eq!(rejection.stage(), Stage::SectionShape);
    assert!(matches!(
        rejection.cause(),
        RejectionCause::RowCountMismatch {
            expected: 4,
            actual: 3,
            ..
        }
    ));
    assert_eq!(election.decrypt_calls(), 0);
}
