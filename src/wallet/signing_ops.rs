//! Signature collection
//!
//! A pending transaction moves `Unsigned -> PartiallySigned -> FullySigned`
//! as its slots fill. Slots are never cleared, so there is no way back.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::codec::{SigningProvider, SpendInput};
use crate::error::WalletError;
use crate::storage::models::{MultisigDescriptor, PendingTransaction};
use crate::storage::KeyRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SigningState {
    Unsigned,
    PartiallySigned,
    FullySigned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningReport {
    pub state: SigningState,
    /// Slots filled by this call
    pub signed: usize,
    pub outstanding: usize,
}

pub fn signing_state(pending: &PendingTransaction) -> SigningState {
    let total = pending.slots().count();
    let outstanding = pending.outstanding_slots();
    if total > 0 && outstanding == 0 {
        SigningState::FullySigned
    } else if outstanding == total {
        SigningState::Unsigned
    } else {
        SigningState::PartiallySigned
    }
}

/// Spend descriptions of the pending transaction's inputs, in input order.
///
/// Shared coins take their descriptor from the coin snapshot or, failing
/// that, from the wallet's multisig table.
pub fn spend_inputs(
    pending: &PendingTransaction,
    multisig: &BTreeMap<String, MultisigDescriptor>,
) -> Result<Vec<SpendInput>, WalletError> {
    pending
        .coins
        .iter()
        .map(|committed| {
            let coin = &committed.coin;
            let descriptor = coin
                .multisig
                .clone()
                .or_else(|| multisig.get(&coin.address).cloned());
            if committed.signatures.len() > 1 && descriptor.is_none() {
                return Err(WalletError::MissingMultisigInfo(coin.address.clone()));
            }
            Ok(SpendInput {
                tx_id: coin.tx_id.clone(),
                out_index: coin.out_index,
                value: coin.value,
                script: coin.script.clone(),
                address: coin.address.clone(),
                multisig: descriptor,
            })
        })
        .collect()
}

/// Fill every outstanding slot the key ring can sign for.
///
/// Slots whose participant is missing from `keys`, or whose key the provider
/// rejects, stay outstanding. On error `pending` is left untouched.
pub fn sign_pending<P: SigningProvider>(
    pending: &mut PendingTransaction,
    codec: &P,
    keys: &KeyRing,
    multisig: &BTreeMap<String, MultisigDescriptor>,
) -> Result<SigningReport, WalletError> {
    let inputs = spend_inputs(pending, multisig)?;
    let mut decoded = codec.decode(&pending.tx, &inputs)?;

    let mut coins = pending.coins.clone();
    let mut signed = 0;
    for (input_index, committed) in coins.iter_mut().enumerate() {
        for slot in committed.signatures.iter_mut().filter(|s| !s.is_filled()) {
            let Some(key) = keys.get(slot.participant_id) else {
                log::debug!(
                    "No key for participant {}, input {} stays outstanding",
                    slot.participant_id,
                    input_index
                );
                continue;
            };
            match codec.sign(&decoded, key, &slot.path, input_index)? {
                Some(signature) => {
                    codec.apply_signature(&mut decoded, &signature)?;
                    slot.signature = Some(signature);
                    signed += 1;
                }
                None => log::warn!(
                    "Participant {} cannot sign input {} at {}",
                    slot.participant_id,
                    input_index,
                    slot.path
                ),
            }
        }
    }
    pending.coins = coins;

    Ok(SigningReport {
        state: signing_state(pending),
        signed,
        outstanding: pending.outstanding_slots(),
    })
}
