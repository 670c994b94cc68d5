//! Basic tests.

use merlin::Transcript;
use num_bigint::BigUint;
use rand::{thread_rng, Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::test_params;
use evote_elgamal::{
    group::GroupParams, tally::aggregate_ciphertexts, CandidateDecryption, Ciphertext,
    DisjunctiveProof, DiscreteLogTable, Keypair, PublicKey, SecretExponentRange, SecretKey,
    VerifiableDecryption, VerificationError,
};

fn test_encryption_roundtrip(params: &GroupParams, range: SecretExponentRange) {
    let mut rng = thread_rng();
    let keypair = Keypair::generate_with_range(params, range, &mut rng);
    let table = DiscreteLogTable::new(params, 1_000);
    for _ in 0..20 {
        let value = rng.gen_range(0..=1_000);
        let ciphertext = keypair.public().encrypt(value, &mut rng);
        assert_eq!(keypair.secret().decrypt_to_element(&ciphertext), params.encode(value));
        assert_eq!(keypair.secret().decrypt(&ciphertext, &table), Some(value));
    }
}

#[test]
fn encryption_roundtrip_with_subgroup_order_exponents() {
    test_encryption_roundtrip(&test_params(), SecretExponentRange::SubgroupOrder);
}

#[test]
fn encryption_roundtrip_with_modulus_exponents() {
    test_encryption_roundtrip(&test_params(), SecretExponentRange::Modulus);
}

#[test]
fn encryption_roundtrip_with_rfc_group() {
    test_encryption_roundtrip(&GroupParams::rfc3526_2048(), SecretExponentRange::default());
}

#[test]
fn encryption_with_generated_group() {
    let mut rng = ChaChaRng::seed_from_u64(123);
    let keypair =
        Keypair::generate_with_new_group(128, SecretExponentRange::default(), &mut rng).unwrap();
    let params = keypair.public().params();
    assert_eq!(params.bit_length(), 128);
    params.verify_primes().unwrap();

    let table = DiscreteLogTable::new(params, 10);
    let ciphertext = keypair.public().encrypt(10, &mut rng);
    assert_eq!(keypair.secret().decrypt(&ciphertext, &table), Some(10));
}

#[test]
fn homomorphic_tallying() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let values: Vec<u64> = (0..50).map(|_| rng.gen_range(0..5)).collect();
    let ciphertexts: Vec<_> = values
        .iter()
        .map(|&value| keypair.public().encrypt(value, &mut rng))
        .collect();

    let sum = aggregate_ciphertexts(&params, &ciphertexts);
    let table = DiscreteLogTable::new(&params, 250);
    assert_eq!(
        keypair.secret().decrypt(&sum, &table),
        Some(values.iter().sum::<u64>())
    );

    // Re-encryption does not change the tally.
    let reencrypted: Vec<Ciphertext> = ciphertexts
        .iter()
        .map(|ciphertext| {
            keypair
                .public()
                .reencrypt(ciphertext, None, &mut rng)
                .unwrap()
                .into()
        })
        .collect();
    let other_sum = aggregate_ciphertexts(&params, &reencrypted);
    assert_ne!(other_sum, sum);
    assert_eq!(
        keypair.secret().decrypt_to_element(&other_sum),
        keypair.secret().decrypt_to_element(&sum)
    );
}

#[test]
fn lookup_table_is_idempotent() {
    let params = test_params();
    let first = DiscreteLogTable::new(&params, 64);
    let second = DiscreteLogTable::new(&params, 64);
    for value in 0..=64 {
        let element = params.encode(value);
        assert_eq!(first.get(&element), Some(value));
        assert_eq!(second.get(&element), Some(value));
    }
    assert_eq!(first.get(&params.encode(65)), None);
}

#[test]
fn disjunctive_proof_soundness() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let receiver = keypair.public();

    let first = receiver
        .encrypt_element(&params.encode(0), None, &mut rng)
        .unwrap();
    let randomness = first.randomness().clone();
    let second = receiver
        .encrypt_element(&params.encode(1), Some(&randomness), &mut rng)
        .unwrap();
    let ciphertexts: Vec<Ciphertext> = vec![first.into(), second.into()];
    let choices = vec![params.encode(1); 2];
    let proof = DisjunctiveProof::new(
        receiver,
        &ciphertexts,
        &choices,
        1,
        &randomness,
        &mut Transcript::new(b"test"),
        &mut rng,
    );
    proof
        .verify(receiver, &ciphertexts, &choices, &mut Transcript::new(b"test"))
        .unwrap();

    // Proof is bound to the transcript.
    assert!(proof
        .verify(receiver, &ciphertexts, &choices, &mut Transcript::new(b"other"))
        .is_err());
    // ...and to the receiver key.
    let other_receiver = Keypair::generate(&params, &mut rng);
    assert!(proof
        .verify(
            other_receiver.public(),
            &ciphertexts,
            &choices,
            &mut Transcript::new(b"test")
        )
        .is_err());

    // Tampering with any proof component is detected.
    let json = serde_json::to_value(&proof).unwrap();
    for branch in 0..2 {
        for field in ["commitment1", "commitment2", "challenge", "response"] {
            let mut tampered = json.clone();
            let value: BigUint = tampered[branch][field].as_str().unwrap().parse().unwrap();
            let value = value + 1_u32;
            tampered[branch][field] = value.to_string().into();
            let tampered: DisjunctiveProof = serde_json::from_value(tampered).unwrap();
            let result =
                tampered.verify(receiver, &ciphertexts, &choices, &mut Transcript::new(b"test"));
            assert!(result.is_err(), "tampered {field} in branch {branch}");
        }
    }
}

#[test]
fn disjunctive_proof_rejects_non_binary_plaintext() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);
    let receiver = keypair.public();

    // Both ciphertexts encrypt 2, so no branch is honest.
    let first = receiver
        .encrypt_element(&params.encode(2), None, &mut rng)
        .unwrap();
    let randomness = first.randomness().clone();
    let second = receiver
        .encrypt_element(&params.encode(2), Some(&randomness), &mut rng)
        .unwrap();
    let ciphertexts: Vec<Ciphertext> = vec![first.into(), second.into()];
    let choices = vec![params.encode(1); 2];
    let proof = DisjunctiveProof::new(
        receiver,
        &ciphertexts,
        &choices,
        0,
        &randomness,
        &mut Transcript::new(b"test"),
        &mut rng,
    );
    let err = proof
        .verify(receiver, &ciphertexts, &choices, &mut Transcript::new(b"test"))
        .unwrap_err();
    assert_eq!(err, VerificationError::EquationMismatch(0));
}

#[test]
fn verifiable_decryption_of_tally() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate_with_range(&params, SecretExponentRange::Modulus, &mut rng);
    let ciphertexts: Vec<_> = (0..10)
        .map(|i| keypair.public().encrypt(i % 2, &mut rng))
        .collect();
    let tally = aggregate_ciphertexts(&params, &ciphertexts);

    let (decryption, proof) = VerifiableDecryption::new(
        &tally,
        keypair.secret(),
        &mut Transcript::new(b"tally"),
        &mut rng,
    );
    let published = serde_json::to_string(&decryption).unwrap();
    let candidate: CandidateDecryption = serde_json::from_str(&published).unwrap();
    let decryption = candidate
        .verify(&tally, keypair.public(), &proof, &mut Transcript::new(b"tally"))
        .unwrap();
    let table = DiscreteLogTable::new(&params, 10);
    assert_eq!(decryption.decrypt(&tally, &params, &table), Some(5));

    let (plaintext, proof) = keypair.secret().decrypt_with_proof(&tally, &mut rng);
    assert_eq!(plaintext, params.encode(5));
    keypair
        .public()
        .verify_decryption(&tally, &plaintext, &proof)
        .unwrap();
}

#[test]
fn key_serialization() {
    let params = test_params();
    let mut rng = thread_rng();
    let keypair = Keypair::generate(&params, &mut rng);

    let public_json = serde_json::to_value(keypair.public()).unwrap();
    let object = public_json.as_object().unwrap();
    let mut fields: Vec<_> = object.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, ["generator", "primeP", "primeQ", "pubKey"]);
    assert_eq!(
        public_json["primeP"].as_str().unwrap(),
        params.modulus().to_string()
    );
    let public: PublicKey = serde_json::from_value(public_json).unwrap();
    assert_eq!(&public, keypair.public());

    let secret_json = serde_json::to_string(keypair.secret()).unwrap();
    let secret: SecretKey = serde_json::from_str(&secret_json).unwrap();
    assert_eq!(secret.public(), keypair.public());

    let keypair_json = serde_json::to_string(&keypair).unwrap();
    let restored: Keypair = serde_json::from_str(&keypair_json).unwrap();
    assert_eq!(restored.public(), keypair.public());

    // Floating-point numbers are not accepted in place of integers.
    let mut malformed = serde_json::to_value(keypair.public()).unwrap();
    malformed["pubKey"] = serde_json::json!(1.5);
    assert!(serde_json::from_value::<PublicKey>(malformed).is_err());
}

#[test]
fn keypair_assembly_checks_consistency() {
    let params = test_params();
    let mut rng = thread_rng();
    let (public, secret) = Keypair::generate(&params, &mut rng).into_tuple();
    let (other_public, _) = Keypair::generate(&params, &mut rng).into_tuple();

    Keypair::from_parts(public, secret.clone()).unwrap();
    assert!(Keypair::from_parts(other_public, secret).is_err());
}
