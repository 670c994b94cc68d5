//! Exponential [ElGamal encryption] over safe-prime groups, with the zero-knowledge proofs
//! and ballot-processing logic needed for an online election: provably valid encrypted
//! ballots, homomorphic tallying and verifiable decryption of vote counts.
//!
//! # ⚠ Warnings
//!
//! While the logic in this crate relies on standard cryptographic assumptions
//! (complexity of discrete log and decisional Diffie–Hellman problems in prime-order
//! subgroups of safe-prime groups), it has not been independently verified for correctness
//! or absence of side-channel attack vectors. Big-integer arithmetic is **not** constant-time.
//! **Use at your own risk.**
//!
//! ElGamal encryption is not a good choice for general-purpose public-key encryption
//! since it is vulnerable to [chosen-ciphertext attacks][CCA]. For security,
//! decryption operations should be limited on the application level.
//!
//! # Overview
//!
//! - [`group`] module provides [`GroupParams`](group::GroupParams): a safe prime `p = 2q + 1`
//!   together with a generator of the order-`q` subgroup. Parameters can be generated,
//!   derived from a known safe prime, or taken from RFC 3526.
//! - [`Ciphertext`] provides ElGamal encryption of group elements; small values are encrypted
//!   using exponential encoding `g^value` and recovered with a [`DiscreteLogTable`].
//!   Participants are represented by [`PublicKey`], [`SecretKey`] and [`Keypair`].
//! - [`DisjunctiveProof`] proves that one of several ciphertexts encrypts its claimed
//!   plaintext without revealing which one. [`LogEqualityProof`] (Chaum–Pedersen) is
//!   the building block of all proofs, including [verifiable decryption](VerifiableDecryption).
//! - [`tally`] module aggregates ciphertexts homomorphically.
//! - [`app`] module provides election-level logic: the ballot encoder, section decoding,
//!   the per-election key registry and the ballot validation pipeline.
//! - [`config`] module contains serializable settings for key generation and validation.
//!
//! # Serialization
//!
//! All types carrying big integers serialize them as decimal strings; deserialization
//! rejects floating-point numbers and other non-decimal representations. Self-consistency
//! of deserialized ciphertexts and proofs is **not** checked on deserialization; it is checked
//! when the corresponding verification methods are called.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events for key generation, key lifecycle transitions
//! and ballot validation. No subscriber is installed by the crate.
//!
//! [ElGamal encryption]: https://en.wikipedia.org/wiki/ElGamal_encryption
//! [CCA]: https://en.wikipedia.org/wiki/Chosen-ciphertext_attack
//! [`tracing`]: https://docs.rs/tracing/

// Documentation settings.
#![cfg_attr(docsrs, feature(doc_cfg))]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

pub mod app;
pub mod config;
mod decryption;
mod encryption;
pub mod group;
mod keys;
mod proofs;
mod serde;
pub mod tally;

pub use crate::{
    decryption::{CandidateDecryption, VerifiableDecryption},
    encryption::{Ciphertext, DiscreteLogTable, EncryptionError, ExtendedCiphertext},
    keys::{KeyError, Keypair, PublicKey, SecretExponentRange, SecretKey},
    proofs::{DisjunctiveProof, LogEqualityProof, VerificationError},
};
