use bip39::Mnemonic;
use bitcoin::key::rand;
use std::collections::BTreeMap;
use std::fmt;

use super::models::{WalletState, LOCAL_PARTICIPANT};
use crate::error::WalletError;

pub struct KeyManager;

impl KeyManager {
    /// Generate a new random BIP39 mnemonic
    pub fn generate() -> Result<Mnemonic, WalletError> {
        let entropy = rand::random::<[u8; 16]>();

        Mnemonic::from_entropy(&entropy).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
    }

    /// Parse a stored mnemonic phrase into seed material
    pub fn key_material(words: &str) -> Result<KeyMaterial, WalletError> {
        let mnemonic =
            Mnemonic::parse(words).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        Ok(KeyMaterial {
            seed: mnemonic.to_seed("").to_vec(),
        })
    }
}

/// Master seed of one participant.
#[derive(Clone)]
pub struct KeyMaterial {
    seed: Vec<u8>,
}

impl KeyMaterial {
    pub fn from_seed(seed: impl Into<Vec<u8>>) -> Self {
        Self { seed: seed.into() }
    }

    pub fn seed(&self) -> &[u8] {
        &self.seed
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// The key material this process may sign with, by participant id.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: BTreeMap<u32, KeyMaterial>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, participant_id: u32, key: KeyMaterial) {
        self.keys.insert(participant_id, key);
    }

    pub fn get(&self, participant_id: u32) -> Option<&KeyMaterial> {
        self.keys.get(&participant_id)
    }

    pub fn participants(&self) -> Vec<u32> {
        self.keys.keys().copied().collect()
    }

    /// Build a key ring from the wallet's own seed and its registered parties.
    ///
    /// `only` restricts the ring to the listed participant ids.
    pub fn from_state(state: &WalletState, only: Option<&[u32]>) -> Result<Self, WalletError> {
        let allowed = |id: u32| only.map_or(true, |ids| ids.contains(&id));

        let mut ring = KeyRing::new();
        if allowed(LOCAL_PARTICIPANT) {
            ring.insert(LOCAL_PARTICIPANT, KeyManager::key_material(&state.seed)?);
        }
        for (id, participant) in &state.participants {
            if allowed(*id) {
                ring.insert(*id, KeyManager::key_material(&participant.seed)?);
            }
        }
        Ok(ring)
    }
}
