//! Per-election key lifecycle and lookup-table cache.

use parking_lot::RwLock;
use rand_core::{CryptoRng, RngCore};

use std::{collections::HashMap, fmt, sync::Arc};

use super::{
    ballot::EncryptedSection,
    decode::{calculate_lookup_table, decrypt_section, DecodeError, DecodedSection, SectionTally},
    pipeline::ElectionKeys,
};
use crate::{
    config::KeyConfig,
    group::{GenerationError, GroupParams},
    DiscreteLogTable, Keypair, PublicKey,
};

/// Error performing an operation on [`ElectionRegistry`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Election keys are already generated.
    #[error("election is already frozen")]
    AlreadyFrozen,
    /// Key generation for the election is in progress.
    #[error("key generation for the election is in progress")]
    GenerationInProgress,
    /// Election has no keys.
    #[error("election is not frozen")]
    NotFrozen,
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    Generation(#[from] GenerationError),
    /// Section decryption failed.
    #[error("cannot decrypt section: {0}")]
    Decode(#[from] DecodeError),
}

/// Key state of an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Election has no keys; its configuration may be edited.
    Unfrozen,
    /// Keys are being generated.
    KeyGenerating,
    /// Keys are generated; ballots may be submitted.
    Frozen,
}

enum KeyState {
    Unfrozen,
    KeyGenerating,
    Frozen(Box<Keypair>),
}

impl KeyState {
    fn status(&self) -> KeyStatus {
        match self {
            Self::Unfrozen => KeyStatus::Unfrozen,
            Self::KeyGenerating => KeyStatus::KeyGenerating,
            Self::Frozen(_) => KeyStatus::Frozen,
        }
    }
}

type ElectionSlot = Arc<RwLock<KeyState>>;

/// Registry of election keys.
///
/// Each election goes through the states `Unfrozen → KeyGenerating → Frozen → Unfrozen`.
/// Freezing generates the election keypair; unfreezing discards it together with
/// the cached lookup tables. The state of each election is guarded by its own
/// reader–writer lock: decryption holds the read lock, so many sections can be decrypted
/// concurrently, while state transitions take the write lock. Key generation itself
/// runs without holding any lock; concurrent transitions are rejected while
/// the election is in the `KeyGenerating` state.
///
/// Lookup tables are cached by `(election_id, max_votes)` and shared via [`Arc`].
///
/// # Examples
///
/// ```
/// # use evote_elgamal::{
/// #     app::{ElectionRegistry, KeyStatus}, config::KeyConfig, group::GroupParams,
/// # };
/// # use rand::thread_rng;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ElectionRegistry::new(KeyConfig::default());
/// let params = GroupParams::rfc3526_2048();
/// let key = registry.freeze_with_group("mayor-2026", &params, &mut thread_rng())?;
/// assert_eq!(registry.status("mayor-2026"), KeyStatus::Frozen);
/// assert_eq!(registry.public_key("mayor-2026").as_ref(), Some(&key));
///
/// registry.unfreeze("mayor-2026")?;
/// assert_eq!(registry.status("mayor-2026"), KeyStatus::Unfrozen);
/// assert!(registry.public_key("mayor-2026").is_none());
/// # Ok(())
/// # }
/// ```
pub struct ElectionRegistry {
    config: KeyConfig,
    elections: RwLock<HashMap<String, ElectionSlot>>,
    lookup_tables: RwLock<HashMap<(String, u64), Arc<DiscreteLogTable>>>,
}

impl fmt::Debug for ElectionRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ElectionRegistry")
            .field("config", &self.config)
            .field("elections", &self.elections.read().len())
            .field("lookup_tables", &self.lookup_tables.read().len())
            .finish()
    }
}

impl ElectionRegistry {
    /// Creates an empty registry generating keys according to `config`.
    pub fn new(config: KeyConfig) -> Self {
        Self {
            config,
            elections: RwLock::new(HashMap::new()),
            lookup_tables: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the key generation settings.
    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    fn slot(&self, election_id: &str) -> Option<ElectionSlot> {
        self.elections.read().get(election_id).cloned()
    }

    fn slot_or_insert(&self, election_id: &str) -> ElectionSlot {
        if let Some(slot) = self.slot(election_id) {
            return slot;
        }
        let mut elections = self.elections.write();
        let slot = elections
            .entry(election_id.to_owned())
            .or_insert_with(|| Arc::new(RwLock::new(KeyState::Unfrozen)));
        Arc::clone(slot)
    }

    /// Returns the key status of the specified election. Unknown elections are `Unfrozen`.
    pub fn status(&self, election_id: &str) -> KeyStatus {
        self.slot(election_id)
            .map_or(KeyStatus::Unfrozen, |slot| slot.read().status())
    }

    /// Returns the public key of a frozen election.
    pub fn public_key(&self, election_id: &str) -> Option<PublicKey> {
        let slot = self.slot(election_id)?;
        let state = slot.read();
        match &*state {
            KeyState::Frozen(keypair) => Some(keypair.public().clone()),
            KeyState::Unfrozen | KeyState::KeyGenerating => None,
        }
    }

    /// Freezes the election, generating a fresh group and keypair according
    /// to the registry [`KeyConfig`]. Returns the public key of the election.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not `Unfrozen`, or if key generation fails.
    /// In the latter case, the election reverts to `Unfrozen`.
    #[tracing::instrument(level = "info", skip(self, rng), err)]
    pub fn freeze<R: CryptoRng + RngCore>(
        &self,
        election_id: &str,
        rng: &mut R,
    ) -> Result<PublicKey, RegistryError> {
        self.transition_to_frozen(election_id, || self.config.generate_keypair(rng))
    }

    /// Freezes the election generating a keypair over the existing group `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not `Unfrozen`.
    #[tracing::instrument(level = "info", skip(self, params, rng), err)]
    pub fn freeze_with_group<R: CryptoRng + RngCore>(
        &self,
        election_id: &str,
        params: &GroupParams,
        rng: &mut R,
    ) -> Result<PublicKey, RegistryError> {
        let range = self.config.secret_exponent_range;
        self.transition_to_frozen(election_id, || {
            Ok(Keypair::generate_with_range(params, range, rng))
        })
    }

    fn transition_to_frozen(
        &self,
        election_id: &str,
        generate: impl FnOnce() -> Result<Keypair, GenerationError>,
    ) -> Result<PublicKey, RegistryError> {
        let slot = self.slot_or_insert(election_id);
        {
            let mut state = slot.write();
            match *state {
                KeyState::Frozen(_) => return Err(RegistryError::AlreadyFrozen),
                KeyState::KeyGenerating => return Err(RegistryError::GenerationInProgress),
                KeyState::Unfrozen => *state = KeyState::KeyGenerating,
            }
        }
        tracing::debug!(election_id, "generating election keys");

        let result = generate();
        let mut state = slot.write();
        match result {
            Ok(keypair) => {
                let public = keypair.public().clone();
                *state = KeyState::Frozen(Box::new(keypair));
                tracing::info!(
                    election_id,
                    bit_length = public.params().bit_length(),
                    "election frozen"
                );
                Ok(public)
            }
            Err(err) => {
                *state = KeyState::Unfrozen;
                tracing::warn!(election_id, %err, "key generation failed; election reverted to unfrozen");
                Err(err.into())
            }
        }
    }

    /// Unfreezes the election, discarding its keypair and cached lookup tables.
    /// The secret exponent is overwritten when the last handle to the keypair is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not `Frozen`.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub fn unfreeze(&self, election_id: &str) -> Result<(), RegistryError> {
        let slot = self.slot(election_id).ok_or(RegistryError::NotFrozen)?;
        let mut state = slot.write();
        match *state {
            KeyState::Unfrozen => return Err(RegistryError::NotFrozen),
            KeyState::KeyGenerating => return Err(RegistryError::GenerationInProgress),
            KeyState::Frozen(_) => *state = KeyState::Unfrozen,
        }
        self.lookup_tables
            .write()
            .retain(|(id, _), _| id != election_id);
        tracing::info!(election_id, "election unfrozen; keys discarded");
        Ok(())
    }

    /// Returns a lookup table for `0..=max_votes` for the specified election, building
    /// and caching it if necessary.
    pub fn lookup_table(
        &self,
        election_id: &str,
        params: &GroupParams,
        max_votes: u64,
    ) -> Arc<DiscreteLogTable> {
        let key = (election_id.to_owned(), max_votes);
        if let Some(table) = self.lookup_tables.read().get(&key) {
            return Arc::clone(table);
        }

        tracing::debug!(election_id, max_votes, "building lookup table");
        let table = Arc::new(calculate_lookup_table(params, max_votes));
        let mut tables = self.lookup_tables.write();
        Arc::clone(tables.entry(key).or_insert(table))
    }

    /// Decrypts a single encrypted section of a frozen election.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not frozen, or if decoding fails.
    pub fn decrypt_section(
        &self,
        election_id: &str,
        section_id: &str,
        section: &EncryptedSection,
        max_votes: u64,
    ) -> Result<DecodedSection, RegistryError> {
        let slot = self.slot(election_id).ok_or(RegistryError::NotFrozen)?;
        let state = slot.read();
        let KeyState::Frozen(keypair) = &*state else {
            return Err(RegistryError::NotFrozen);
        };
        let table = self.lookup_table(election_id, keypair.public().params(), max_votes);
        Ok(decrypt_section(keypair.secret(), section, section_id, &table)?)
    }

    /// Decrypts a homomorphic tally of sections of a frozen election.
    ///
    /// # Errors
    ///
    /// Returns an error if the election is not frozen, or if decoding fails.
    pub fn decrypt_tally(
        &self,
        election_id: &str,
        section_id: &str,
        tally: &SectionTally,
    ) -> Result<DecodedSection, RegistryError> {
        let slot = self.slot(election_id).ok_or(RegistryError::NotFrozen)?;
        let state = slot.read();
        let KeyState::Frozen(keypair) = &*state else {
            return Err(RegistryError::NotFrozen);
        };
        let table = self.lookup_table(election_id, keypair.public().params(), tally.rows());
        Ok(tally.decrypt(keypair.secret(), section_id, &table)?)
    }
}

impl ElectionKeys for ElectionRegistry {
    fn public_key(&self, election_id: &str) -> Option<PublicKey> {
        ElectionRegistry::public_key(self, election_id)
    }

    fn decrypt_section(
        &self,
        election_id: &str,
        section_id: &str,
        section: &EncryptedSection,
        max_votes: u64,
    ) -> Result<DecodedSection, RegistryError> {
        ElectionRegistry::decrypt_section(self, election_id, section_id, section, max_votes)
    }
}
