//! Integration tests for the public crate API.

use num_bigint::BigUint;

use evote_elgamal::group::GroupParams;

mod ballots;
mod basic;
mod pipeline;

/// 256-bit safe prime; small enough to keep tests fast.
const TEST_MODULUS_HEX: &str = "8cd70ab73afbf7aa78b20750351be3d6732096480daf4991d6b936f457421bf7";

pub fn test_params() -> GroupParams {
    let modulus = BigUint::parse_bytes(TEST_MODULUS_HEX.as_bytes(), 16).unwrap();
    GroupParams::from_safe_prime(modulus).unwrap()
}
