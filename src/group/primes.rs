//! Probabilistic primality testing and safe-prime search.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};

/// Number of Miller–Rabin rounds. The error probability for a composite is at most `4^-rounds`.
pub(super) const MILLER_RABIN_ROUNDS: usize = 40;

/// Upper bound for the trial-division sieve applied before Miller–Rabin.
const SIEVE_LIMIT: usize = 2_000;
/// Number of primes below `SIEVE_LIMIT`.
const SMALL_PRIME_COUNT: usize = 303;

/// Primes below `SIEVE_LIMIT`, computed at compile time.
static SMALL_PRIMES: [u32; SMALL_PRIME_COUNT] = small_primes();

/// Eratosthenes sieve over `2..SIEVE_LIMIT`.
#[allow(clippy::cast_possible_truncation)] // `i < SIEVE_LIMIT`
const fn small_primes() -> [u32; SMALL_PRIME_COUNT] {
    let mut is_composite = [false; SIEVE_LIMIT];
    let mut primes = [0_u32; SMALL_PRIME_COUNT];
    let mut count = 0;
    let mut i = 2;
    while i < SIEVE_LIMIT {
        if !is_composite[i] {
            primes[count] = i as u32;
            count += 1;
            let mut multiple = i * i;
            while multiple < SIEVE_LIMIT {
                is_composite[multiple] = true;
                multiple += i;
            }
        }
        i += 1;
    }
    assert!(count == SMALL_PRIME_COUNT, "SMALL_PRIME_COUNT is out of sync");
    primes
}

fn has_small_factor(candidate: &BigUint, primes: &[u32]) -> bool {
    primes.iter().any(|&prime| {
        let remainder = candidate % prime;
        remainder.is_zero() && *candidate != BigUint::from(prime)
    })
}

/// Miller–Rabin probable-prime test with witnesses drawn from `rng`.
pub(crate) fn is_probable_prime<R: CryptoRng + RngCore>(
    candidate: &BigUint,
    rounds: usize,
    rng: &mut R,
) -> bool {
    let two = BigUint::from(2_u32);
    if *candidate < two {
        return false;
    }
    if SMALL_PRIMES
        .iter()
        .any(|&prime| *candidate == BigUint::from(prime))
    {
        return true;
    }
    if has_small_factor(candidate, &SMALL_PRIMES) {
        return false;
    }
    miller_rabin(candidate, rounds, rng)
}

/// Runs Miller–Rabin rounds on an odd `candidate > SIEVE_LIMIT`.
fn miller_rabin<R: CryptoRng + RngCore>(candidate: &BigUint, rounds: usize, rng: &mut R) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2_u32);
    let candidate_minus_one = candidate - &one;
    let shift = candidate_minus_one.trailing_zeros().unwrap_or(0);
    let odd_part = &candidate_minus_one >> shift;

    'witnesses: for _ in 0..rounds {
        let witness = rng.gen_biguint_range(&two, &candidate_minus_one);
        let mut power = witness.modpow(&odd_part, candidate);
        if power == one || power == candidate_minus_one {
            continue;
        }
        for _ in 1..shift {
            power = &power * &power % candidate;
            if power == candidate_minus_one {
                continue 'witnesses;
            }
            if power == one {
                return false;
            }
        }
        return false;
    }
    true
}

/// Outcome of a safe-prime search.
#[derive(Debug)]
pub(super) enum SafePrimeSearch {
    Found { modulus: BigUint, candidates: u64 },
    Exhausted,
}

/// Samples random `bit_length`-bit candidates `p` until both `p` and `q = (p - 1) / 2`
/// are probable primes, or `max_candidates` is reached.
pub(super) fn find_safe_prime<R: CryptoRng + RngCore>(
    bit_length: u64,
    max_candidates: Option<u64>,
    rng: &mut R,
) -> SafePrimeSearch {
    // `p ≡ 3 (mod 4)` ensures that `q` is odd.
    let low_bits = BigUint::from(3_u32);
    let top_bit = BigUint::one() << (bit_length - 1);

    let mut candidates = 0_u64;
    loop {
        if max_candidates.map_or(false, |max| candidates >= max) {
            return SafePrimeSearch::Exhausted;
        }
        candidates += 1;

        let mut modulus = rng.gen_biguint(bit_length);
        modulus |= &top_bit;
        modulus |= &low_bits;
        let order = &modulus >> 1_u32;
        if has_small_factor(&modulus, &SMALL_PRIMES) || has_small_factor(&order, &SMALL_PRIMES) {
            continue;
        }

        if miller_rabin(&order, MILLER_RABIN_ROUNDS, rng)
            && miller_rabin(&modulus, MILLER_RABIN_ROUNDS, rng)
        {
            return SafePrimeSearch::Found {
                modulus,
                candidates,
            };
        }
    }
}
