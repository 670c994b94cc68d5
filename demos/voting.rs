//! Election walkthrough: freezing election keys, encrypting ballots on the voter side,
//! validating submitted ballots and decrypting the anonymous tally.
//!
//! Voter authentication and ballot storage are emulated with in-memory collections.
//! Run with `RUST_LOG=evote_elgamal=debug` to see validation logs.

use clap::Parser;
use rand::{seq::IteratorRandom, thread_rng, Rng};
use tracing_subscriber::EnvFilter;

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashSet},
    error::Error as StdError,
};

use evote_elgamal::{
    app::{
        section_options, AuditableRow, BallotDirectory, BallotEncoder, BallotPaperConfig,
        ElectionRegistry, ElectionStatus, FilledBallotPaper, OptionId, PlainRow, SectionConfig,
        SectionTally, ValidationPipeline, VoterRegistry, VoterStatus,
    },
    config::{Config, KeyConfig},
    group::GroupParams,
};

const ELECTION_ID: &str = "city-council";
const PAPER_ID: &str = "ballot";
const SECTION_ID: &str = "council";

/// Online election walkthrough using exponential ElGamal encryption.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of candidates in the section.
    #[arg(name = "candidates", long, default_value = "3")]
    candidates_count: usize,
    /// Number of voters.
    #[arg(name = "voters", long, default_value = "10")]
    voters_count: usize,
    /// Number of rows (votes) per ballot.
    #[arg(name = "rows", long, short, default_value = "2")]
    rows: u64,
    /// Bit length of a freshly generated group. If not specified, the RFC 3526 2048-bit
    /// group is used.
    #[arg(name = "bits", long)]
    bit_length: Option<u64>,
    /// Probability that a voter invalidates the whole ballot.
    #[arg(name = "invalid", long, default_value = "0.1")]
    invalid_probability: f64,
}

#[derive(Debug)]
struct Directory {
    paper: BallotPaperConfig,
}

impl BallotDirectory for Directory {
    fn ballot_paper(&self, ballot_paper_id: &str) -> Option<BallotPaperConfig> {
        (ballot_paper_id == self.paper.id).then(|| self.paper.clone())
    }

    fn election_status(&self, election_id: &str) -> Option<ElectionStatus> {
        (election_id == self.paper.election_id).then_some(ElectionStatus {
            started: true,
            frozen: true,
            ended: false,
        })
    }
}

#[derive(Debug, Default)]
struct Voters {
    registered: HashSet<String>,
    voted: RefCell<HashSet<String>>,
}

impl VoterRegistry for Voters {
    fn voter_status(&self, voter_id: &str, _ballot_paper_id: &str) -> VoterStatus {
        if !self.registered.contains(voter_id) {
            VoterStatus::NotRegistered
        } else if self.voted.borrow().contains(voter_id) {
            VoterStatus::AlreadyVoted
        } else {
            VoterStatus::Eligible
        }
    }
}

impl Args {
    fn paper(&self) -> BallotPaperConfig {
        let candidates: BTreeSet<_> = (1..=self.candidates_count)
            .map(|i| format!("candidate-{i}"))
            .collect();
        let section = SectionConfig {
            max_votes: self.rows,
            max_votes_per_candidate: self.rows,
            candidates,
        };
        BallotPaperConfig {
            id: PAPER_ID.to_owned(),
            election_id: ELECTION_ID.to_owned(),
            max_votes: self.rows,
            max_votes_per_candidate: self.rows,
            sections: [(SECTION_ID.to_owned(), section)].into_iter().collect(),
        }
    }

    fn run(self) -> Result<(), Box<dyn StdError>> {
        println!("Running with args {self:?}");
        let mut rng = thread_rng();

        let config = Config {
            keys: KeyConfig {
                bit_length: self.bit_length.unwrap_or(2_048),
                ..KeyConfig::default()
            },
            ..Config::default()
        };
        config.validate()?;
        let registry = ElectionRegistry::new(config.keys.clone());
        let public_key = if self.bit_length.is_some() {
            registry.freeze(ELECTION_ID, &mut rng)?
        } else {
            registry.freeze_with_group(ELECTION_ID, &GroupParams::rfc3526_2048(), &mut rng)?
        };
        println!(
            "Election key: {}",
            serde_json::to_string_pretty(&public_key)?
        );

        let directory = Directory {
            paper: self.paper(),
        };
        let voters = Voters {
            registered: (0..self.voters_count).map(|i| format!("voter-{i}")).collect(),
            voted: RefCell::default(),
        };
        let pipeline = ValidationPipeline::new(&directory, &voters, &registry)
            .with_config(config.pipeline.clone());

        let section_config = &directory.paper.sections[SECTION_ID];
        let options = section_options(&section_config.candidates)?;
        let encoder = BallotEncoder::new(&public_key);
        let mut expected = BTreeMap::<OptionId, u64>::new();
        let mut tally = SectionTally::default();

        for i in 0..self.voters_count {
            let voter_id = format!("voter-{i}");
            let invalidate = rng.gen_bool(self.invalid_probability);
            let choices: Vec<OptionId> = (0..self.rows)
                .map(|_| {
                    if invalidate {
                        OptionId::Invalid
                    } else {
                        options
                            .iter()
                            .filter(|&option| *option != OptionId::Invalid)
                            .choose(&mut rng)
                            .cloned()
                            .unwrap_or(OptionId::NoVote)
                    }
                })
                .collect();
            println!("\n{voter_id} votes for {choices:?}");

            let rows = choices
                .iter()
                .map(|choice| PlainRow::one_hot(&options, choice))
                .collect::<Result<Vec<_>, _>>()?;
            let mut audit: Vec<AuditableRow> = vec![];
            let section = encoder.encrypt_section(&rows, &mut audit, &mut rng)?;
            println!(
                "First row audit record: {}",
                serde_json::to_string(&audit[0])?
            );

            let ballot = FilledBallotPaper {
                ballot_paper_id: PAPER_ID.to_owned(),
                sections: [(SECTION_ID.to_owned(), section)].into_iter().collect(),
            };
            // Emulate transfer via network.
            let json = serde_json::to_string(&ballot)?;
            match pipeline.validate_json(&voter_id, &json) {
                Ok(accepted) => {
                    println!("Ballot accepted: {:?}", accepted.totals.sections[SECTION_ID]);
                    voters.voted.borrow_mut().insert(voter_id.clone());
                    tally.add_section(public_key.params(), &accepted.ballot.sections[SECTION_ID])?;
                    for choice in choices {
                        *expected.entry(choice).or_default() += 1;
                    }
                }
                Err(rejection) => {
                    println!("Ballot rejected: {rejection} ({})", rejection.cause());
                }
            }

            // Voting twice is forbidden.
            if i == 0 {
                let rejection = pipeline
                    .validate_json(&voter_id, &json)
                    .err()
                    .ok_or("repeated ballot was accepted")?;
                println!("Repeated ballot rejected: {rejection}");
            }
        }

        if tally.rows() == 0 {
            println!("\nNo ballots were accepted");
            return Ok(());
        }
        let decoded = registry.decrypt_tally(ELECTION_ID, SECTION_ID, &tally)?;
        println!("\nDecrypted tally: {}", serde_json::to_string_pretty(&decoded)?);
        for (candidate, &votes) in &decoded.candidate_results {
            let expected_votes = expected
                .get(&OptionId::Candidate(candidate.clone()))
                .copied()
                .unwrap_or(0);
            assert_eq!(votes, expected_votes, "unexpected tally for {candidate}");
        }
        assert_eq!(
            decoded.invalid_count,
            expected.get(&OptionId::Invalid).copied().unwrap_or(0)
        );
        println!("The decrypted tally is as expected!");
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
    Args::parse().run()
}
