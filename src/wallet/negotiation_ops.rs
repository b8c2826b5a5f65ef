//! Transaction negotiation
//!
//! Candidate coins are offered to the transaction service as a hint; the
//! inputs it reports back must all come from that hint before anything is
//! committed locally.

use chrono::Utc;
use std::collections::BTreeMap;

use super::events::WalletEvent;
use super::WalletContext;
use crate::codec::SigningProvider;
use crate::error::WalletError;
use crate::service::{ComposedTx, IssuanceRequest, IssuanceTarget, RemoteCoin, TransferRequest};
use crate::storage::models::{
    AddressRecord, Coin, CommittedCoin, PendingTransaction, Purpose, SignatureSlot,
    TransferTarget, WalletState, LOCAL_PARTICIPANT,
};

/// Coloring kernel requested for new issues
pub const ISSUANCE_KERNEL: &str = "epobc";

/// Negotiate an issuance of `amount` to `target_address` funded by the
/// wallet's uncolored coins. Returns the index of the new pending transaction.
pub async fn build_issuance<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    target_address: &str,
    target_path: &str,
    amount: u64,
    change_address: &str,
) -> Result<usize, WalletError> {
    if amount == 0 {
        return Err(WalletError::InvalidInput(
            "issuance amount must be positive".to_string(),
        ));
    }

    let candidates = select_nonempty(state, "", LOCAL_PARTICIPANT)?;
    let request = IssuanceRequest {
        target: IssuanceTarget {
            address: target_address.to_string(),
            value: amount,
        },
        source_coins: candidates.iter().map(RemoteCoin::from).collect(),
        change_address: change_address.to_string(),
        kernel: ISSUANCE_KERNEL.to_string(),
    };

    log::info!(
        "Requesting issuance of {} to {} from {} candidate coin(s)",
        amount,
        target_address,
        candidates.len()
    );
    let composed = ctx.tx_service.create_issuance(&request).await?;

    let purpose = Purpose::Issue {
        path: target_path.to_string(),
        amount,
    };
    record_pending(state, ctx, composed, &candidates, purpose)
}

/// Negotiate a transfer to `targets`.
///
/// `sources` maps each color to the participant whose coins fund it;
/// `change_addresses` maps each color to its change address.
pub async fn build_transfer<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    targets: Vec<TransferTarget>,
    sources: &BTreeMap<String, u32>,
    change_addresses: BTreeMap<String, String>,
    participants: Vec<u32>,
) -> Result<usize, WalletError> {
    if targets.is_empty() {
        return Err(WalletError::InvalidInput(
            "transfer needs at least one target".to_string(),
        ));
    }
    if let Some(target) = targets.iter().find(|t| !sources.contains_key(&t.color)) {
        return Err(WalletError::InvalidInput(format!(
            "no source given for color '{}'",
            target.color
        )));
    }

    let mut candidates = Vec::new();
    let mut source_coins = BTreeMap::new();
    for (color, owner_id) in sources {
        let selected = select_nonempty(state, color, *owner_id)?;
        source_coins.insert(
            color.clone(),
            selected.iter().map(RemoteCoin::from).collect::<Vec<_>>(),
        );
        candidates.extend(selected);
    }

    let request = TransferRequest {
        targets: targets.clone(),
        source_coins,
        change_address: change_addresses,
    };
    log::info!(
        "Requesting transfer to {} target(s) from {} candidate coin(s)",
        targets.len(),
        candidates.len()
    );
    let composed = ctx.tx_service.create_transfer(&request).await?;

    let purpose = Purpose::Transfer {
        targets,
        participants,
    };
    record_pending(state, ctx, composed, &candidates, purpose)
}

fn select_nonempty(
    state: &WalletState,
    color: &str,
    owner_id: u32,
) -> Result<Vec<Coin>, WalletError> {
    let selected = state.coins.select(color, owner_id);
    if selected.is_empty() {
        return Err(WalletError::NoSpendableCoins {
            color: color.to_string(),
            owner_id,
        });
    }
    Ok(selected)
}

/// One outstanding slot per signer of an address.
pub fn signature_slots(record: &AddressRecord) -> Vec<SignatureSlot> {
    match record {
        AddressRecord::Simple { path } => {
            vec![SignatureSlot::outstanding(LOCAL_PARTICIPANT, path.clone())]
        }
        AddressRecord::Shared { path, participants } => participants
            .iter()
            .map(|id| SignatureSlot::outstanding(*id, path.clone()))
            .collect(),
    }
}

/// Reconcile the service's inputs against `candidates`, commit them and
/// append the pending transaction.
fn record_pending<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    composed: ComposedTx,
    candidates: &[Coin],
    purpose: Purpose,
) -> Result<usize, WalletError> {
    if composed.input_coins.is_empty() {
        return Err(WalletError::Reconciliation(
            "transaction service returned no inputs".to_string(),
        ));
    }

    let mut committed = Vec::with_capacity(composed.input_coins.len());
    for input in &composed.input_coins {
        let id = input.id();
        let coin = candidates
            .iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| {
                WalletError::Reconciliation(format!(
                    "service spends {} which was not offered",
                    id
                ))
            })?;
        let record = state.known_addresses.get(&coin.address).ok_or_else(|| {
            WalletError::Reconciliation(format!(
                "coin {} sits at unknown address {}",
                id, coin.address
            ))
        })?;
        committed.push(CommittedCoin {
            coin: coin.clone(),
            signatures: signature_slots(record),
        });
    }

    let ids: Vec<_> = committed.iter().map(|c| c.coin.id()).collect();
    state.coins.commit(&ids, &purpose)?;

    let kind = match &purpose {
        Purpose::Issue { .. } => "issue",
        Purpose::Transfer { .. } => "transfer",
    };
    state.pending_txs.push(PendingTransaction {
        tx: composed.tx,
        purpose,
        coins: committed,
        created_at: Utc::now(),
        submitted_tx: None,
    });
    let index = state.pending_txs.len() - 1;

    ctx.emit(WalletEvent::TransactionNegotiated {
        index,
        kind: kind.to_string(),
        inputs: ids.len(),
    });
    Ok(index)
}
