//! Tests for ballot encoding, decoding and the key registry.

use rand::{seq::SliceRandom, thread_rng};

use std::{collections::BTreeSet, sync::Arc, thread};

use crate::test_params;
use evote_elgamal::{
    app::{
        calculate_lookup_table, decrypt_section, row_choices, section_options, verify_row,
        AuditableRow, BallotEncoder, DecodeError, ElectionRegistry, EncryptedSection,
        FilledBallotPaper, KeyStatus, OptionId, PlainRow, RegistryError, SectionTally,
    },
    config::KeyConfig,
    Keypair,
};

fn options(candidates: &[&str]) -> BTreeSet<OptionId> {
    let candidates: Vec<_> = candidates.iter().map(|&id| id.to_owned()).collect();
    section_options(&candidates).unwrap()
}

fn choice(id: &str) -> OptionId {
    id.parse().unwrap()
}

fn plain_rows(options: &BTreeSet<OptionId>, choices: &[&str]) -> Vec<PlainRow> {
    choices
        .iter()
        .map(|&id| PlainRow::one_hot(options, &choice(id)).unwrap())
        .collect()
}

#[test]
fn decoding_mixed_section() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let encoder = BallotEncoder::new(keypair.public());
    let options = options(&["A", "B"]);
    let rows = plain_rows(&options, &["A", "A", "noVote", "invalid"]);

    let mut audit: Vec<AuditableRow> = vec![];
    let section = encoder.encrypt_section(&rows, &mut audit, &mut rng).unwrap();
    assert_eq!(audit.len(), 4);
    for row in &section.votes {
        verify_row(keypair.public(), row).unwrap();
    }

    let table = calculate_lookup_table(&params, 4);
    let decoded = decrypt_section(keypair.secret(), &section, "main", &table).unwrap();
    assert_eq!(decoded.candidate_results["A"], 2);
    assert_eq!(decoded.candidate_results["B"], 0);
    assert_eq!(decoded.no_vote_count, 1);
    assert_eq!(decoded.invalid_count, 1);
}

#[test]
fn audit_records_reveal_row_plaintexts() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let encoder = BallotEncoder::new(keypair.public());
    let options = options(&["A", "B", "C"]);
    let rows = plain_rows(&options, &["B"]);

    let mut audit: Vec<AuditableRow> = vec![];
    let section = encoder.encrypt_section(&rows, &mut audit, &mut rng).unwrap();
    let record = &audit[0];
    assert_eq!(record.ciphertexts, section.votes[0].ciphertexts());

    // Anyone holding the record can re-create the ciphertexts for the claimed vote.
    for (plain_bit, ciphertext) in rows[0].bits().zip(&record.ciphertexts) {
        let expected = keypair
            .public()
            .encrypt_element(&params.encode(plain_bit), Some(&record.randomness), &mut rng)
            .unwrap();
        assert_eq!(expected.ciphertext(), ciphertext);
    }

    // Records serialize with decimal randomness.
    let json = serde_json::to_value(record).unwrap();
    assert_eq!(
        json["randomness"].as_str().unwrap(),
        record.randomness.to_string()
    );
    assert_eq!(json["ciphertexts"].as_array().unwrap().len(), 5);
}

#[test]
fn row_proofs_use_uniform_choices() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let choices = row_choices(keypair.public(), 3);
    assert_eq!(choices, vec![params.encode(1); 3]);
}

#[test]
fn filled_ballot_wire_format() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let encoder = BallotEncoder::new(keypair.public());
    let options = options(&["A"]);
    let section = encoder
        .encrypt_section(&plain_rows(&options, &["A", "noVote"]), &mut (), &mut rng)
        .unwrap();
    let ballot = FilledBallotPaper {
        ballot_paper_id: "paper".to_owned(),
        sections: [("main".to_owned(), section)].into_iter().collect(),
    };

    let json = serde_json::to_value(&ballot).unwrap();
    assert_eq!(json["ballotPaperId"], "paper");
    let rows = json["sections"]["main"]["votes"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let row = rows[0].as_object().unwrap();
    let option_ids: Vec<_> = row.keys().map(String::as_str).collect();
    assert_eq!(option_ids, ["A", "invalid", "noVote"]);
    for option in row.values() {
        let mut fields: Vec<_> = option.as_object().unwrap().keys().cloned().collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            ["alpha", "beta", "challenge", "commitment1", "commitment2", "response"]
        );
    }

    let restored: FilledBallotPaper = serde_json::from_value(json).unwrap();
    assert_eq!(restored, ballot);
}

#[test]
fn anonymous_tally_across_ballots() {
    let params = test_params();
    let mut rng = thread_rng();
    let registry = ElectionRegistry::new(KeyConfig::default());
    let key = registry.freeze_with_group("city", &params, &mut rng).unwrap();
    let encoder = BallotEncoder::new(&key);
    let options = options(&["A", "B"]);

    let mut votes = vec!["A"; 7];
    votes.extend(["B"; 4]);
    votes.extend(["noVote"; 2]);
    votes.shuffle(&mut rng);

    let mut tally = SectionTally::default();
    for &vote in &votes {
        let section = encoder
            .encrypt_section(&plain_rows(&options, &[vote]), &mut (), &mut rng)
            .unwrap();
        tally.add_section(&params, &section).unwrap();
    }
    assert_eq!(tally.rows(), 13);

    let decoded = registry.decrypt_tally("city", "mayor", &tally).unwrap();
    assert_eq!(decoded.candidate_results["A"], 7);
    assert_eq!(decoded.candidate_results["B"], 4);
    assert_eq!(decoded.no_vote_count, 2);
    assert_eq!(decoded.invalid_count, 0);
}

#[test]
fn registry_discards_keys_on_unfreeze() {
    let params = test_params();
    let mut rng = thread_rng();
    let registry = ElectionRegistry::new(KeyConfig::default());
    let key = registry.freeze_with_group("city", &params, &mut rng).unwrap();
    let encoder = BallotEncoder::new(&key);
    let section = encoder
        .encrypt_section(&plain_rows(&options(&["A"]), &["A"]), &mut (), &mut rng)
        .unwrap();
    registry.decrypt_section("city", "s", &section, 1).unwrap();

    registry.unfreeze("city").unwrap();
    assert_eq!(registry.status("city"), KeyStatus::Unfrozen);
    let err = registry.decrypt_section("city", "s", &section, 1).unwrap_err();
    assert!(matches!(err, RegistryError::NotFrozen));

    // Sections encrypted for the discarded key do not decode under a new key.
    registry.freeze_with_group("city", &params, &mut rng).unwrap();
    let err = registry.decrypt_section("city", "s", &section, 1).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Decode(DecodeError::LookupExhausted { .. })
    ));
}

#[test]
fn registry_is_shared_between_threads() {
    let params = test_params();
    let registry = Arc::new(ElectionRegistry::new(KeyConfig::default()));
    let key = registry
        .freeze_with_group("city", &params, &mut thread_rng())
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            thread::spawn(move || {
                let mut rng = thread_rng();
                let encoder = BallotEncoder::new(&key);
                let vote = if i % 2 == 0 { "A" } else { "invalid" };
                let section = encoder
                    .encrypt_section(&plain_rows(&options(&["A"]), &[vote, vote]), &mut (), &mut rng)
                    .unwrap();
                registry.decrypt_section("city", "s", &section, 2).unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let decoded = handle.join().unwrap();
        if i % 2 == 0 {
            assert_eq!(decoded.candidate_results["A"], 2);
        } else {
            assert_eq!(decoded.invalid_count, 2);
        }
    }
}

#[test]
fn empty_sections_cannot_be_decoded() {
    let params = test_params();
    let keypair = Keypair::generate(&params, &mut thread_rng());
    let table = calculate_lookup_table(&params, 0);
    let err = decrypt_section(keypair.secret(), &EncryptedSection::default(), "s", &table)
        .unwrap_err();
    assert!(matches!(err, DecodeError::EmptySection(_)));
}
