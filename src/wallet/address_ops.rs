//! Derivation path allocation and address registration
//!
//! Paths are issued per purpose prefix from a persisted counter, so they are
//! never reused across restarts and can be re-enumerated without a log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::WalletContext;
use crate::codec::SigningProvider;
use crate::error::WalletError;
use crate::storage::models::{AddressRecord, MultisigDescriptor, WalletState};
use crate::storage::KeyMaterial;

/// Uncolored funding addresses
pub const FUNDING_PREFIX: &str = "m/0/0";
/// Issuance targets
pub const ISSUANCE_PREFIX: &str = "m/0/1";
/// Colored change
pub const COLORED_PREFIX: &str = "m/0/2";
/// Shared (multisig) addresses with secondary parties
pub const SHARED_PREFIX: &str = "m/0/3";

/// Highest issued index per prefix; absent means nothing issued (-1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathCounters(BTreeMap<String, i64>);

impl PathCounters {
    /// Issue the next path under `prefix`
    pub fn allocate(&mut self, prefix: &str) -> String {
        let counter = self.0.entry(prefix.to_string()).or_insert(-1);
        *counter += 1;
        format!("{}/{}", prefix, counter)
    }

    /// Highest issued index, or -1
    pub fn current(&self, prefix: &str) -> i64 {
        self.0.get(prefix).copied().unwrap_or(-1)
    }

    /// Paths `prefix/0 ..= prefix/max_index`
    pub fn enumerate(&self, prefix: &str, max_index: i64) -> Vec<String> {
        (0..=max_index).map(|i| format!("{}/{}", prefix, i)).collect()
    }

    /// Every path issued so far under `prefix`
    pub fn issued(&self, prefix: &str) -> Vec<String> {
        self.enumerate(prefix, self.current(prefix))
    }
}

/// Allocate a fresh single-owner address, register it and start monitoring it.
pub async fn new_simple_address<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    key: &KeyMaterial,
    prefix: &str,
) -> Result<(String, String), WalletError> {
    let path = state.hd_paths.allocate(prefix);
    let address = ctx.codec.derive_address(key, &path)?;
    register_address(state, &address, AddressRecord::Simple { path: path.clone() })?;
    ctx.monitoring
        .add_address(&state.monitoring_group, &address)
        .await?;
    log::info!("New address {} at {}", address, path);
    Ok((address, path))
}

/// Allocate a 2-of-2 address shared between the wallet and `participant_id`.
pub async fn new_shared_address<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    local_key: &KeyMaterial,
    remote_key: &KeyMaterial,
    participant_id: u32,
) -> Result<(String, String), WalletError> {
    let path = state.hd_paths.allocate(SHARED_PREFIX);
    let public_keys = vec![
        ctx.codec.derive_public_key(local_key, &path)?,
        ctx.codec.derive_public_key(remote_key, &path)?,
    ];
    let threshold = public_keys.len();
    let address = ctx.codec.make_shared_address(&public_keys, threshold)?;

    register_address(
        state,
        &address,
        AddressRecord::Shared {
            path: path.clone(),
            participants: vec![crate::storage::models::LOCAL_PARTICIPANT, participant_id],
        },
    )?;
    state.multisig.insert(
        address.clone(),
        MultisigDescriptor {
            public_keys,
            threshold,
        },
    );
    ctx.monitoring
        .add_address(&state.monitoring_group, &address)
        .await?;
    log::info!(
        "New shared address {} at {} with participant {}",
        address,
        path,
        participant_id
    );
    Ok((address, path))
}

/// Addresses are registered once and never removed or rebound.
pub fn register_address(
    state: &mut WalletState,
    address: &str,
    record: AddressRecord,
) -> Result<(), WalletError> {
    match state.known_addresses.get(address) {
        Some(existing) if *existing != record => Err(WalletError::InvalidInput(format!(
            "address {} already registered at {}",
            address,
            existing.path()
        ))),
        Some(_) => Ok(()),
        None => {
            state.known_addresses.insert(address.to_string(), record);
            Ok(())
        }
    }
}
