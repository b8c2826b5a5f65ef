//! Finalization and broadcast
//!
//! Broadcast is the one irreversible step. The pending transaction is only
//! dropped once monitoring, submission and the local ledger update all went
//! through. A submitted transaction stays pending until then, marked so it
//! is neither resent nor abandoned.

use std::collections::BTreeMap;

use super::events::WalletEvent;
use super::signing_ops::spend_inputs;
use super::sync_ops::process_record;
use super::WalletContext;
use crate::codec::{FinalizedTx, SigningProvider};
use crate::error::WalletError;
use crate::service::TxStateRecord;
use crate::storage::models::{
    CoinStatus, MultisigDescriptor, PendingTransaction, Purpose, WalletState,
};

/// Color identifier of an issue made by `tx_id`.
pub fn color_id(tx_id: &str) -> String {
    format!("epobc:{}:0:0", tx_id)
}

/// Assemble the signed transaction. Requires every slot to be filled.
pub fn finalize<P: SigningProvider>(
    pending: &PendingTransaction,
    codec: &P,
    multisig: &BTreeMap<String, MultisigDescriptor>,
) -> Result<FinalizedTx, WalletError> {
    let outstanding = pending.outstanding_slots();
    if outstanding > 0 {
        return Err(WalletError::IncompleteSignatures { outstanding });
    }

    let inputs = spend_inputs(pending, multisig)?;
    let mut decoded = codec.decode(&pending.tx, &inputs)?;
    for signature in pending.slots().filter_map(|s| s.signature.as_ref()) {
        codec.apply_signature(&mut decoded, signature)?;
    }
    if !codec.is_fully_signed(&decoded) {
        return Err(WalletError::Bitcoin(
            "collected signatures do not validate".to_string(),
        ));
    }
    codec.finalize(&decoded)
}

/// Finalize and broadcast the pending transaction at `index`.
///
/// Once the network accepts the transaction the submission is recorded on
/// the pending entry and its coins, before anything else can fail. A pending
/// entry that already carries a submitted id is not sent again; only the
/// local ledger update is retried.
pub async fn broadcast<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    index: usize,
) -> Result<String, WalletError> {
    let pending = state
        .pending_txs
        .get(index)
        .cloned()
        .ok_or_else(|| WalletError::InvalidInput(format!("no pending transaction #{}", index)))?;

    let tx_id = match &pending.submitted_tx {
        Some(tx_id) => {
            log::info!("Transaction {} was already submitted, resuming", tx_id);
            tx_id.clone()
        }
        None => {
            let finalized = finalize(&pending, ctx.codec, &state.multisig)?;

            // monitor before submitting so the first status change is never missed
            ctx.monitoring
                .add_transaction(&state.monitoring_group, &finalized.tx_id)
                .await?;
            ctx.tx_service.submit(&finalized.tx).await?;
            log::info!("Submitted transaction {}", finalized.tx_id);

            record_submission(state, index, &finalized.tx_id);
            finalized.tx_id
        }
    };

    let record = TxStateRecord {
        tx_id: tx_id.clone(),
        status: CoinStatus::Unconfirmed,
        block_height: None,
    };
    process_record(state, ctx, &record).await?;

    state.pending_txs.remove(index);
    ctx.emit(WalletEvent::TransactionBroadcast {
        tx_id: tx_id.clone(),
    });
    Ok(tx_id)
}

/// Mark the pending entry at `index` and its coins as spent by `tx_id`.
fn record_submission(state: &mut WalletState, index: usize, tx_id: &str) {
    let Some(pending) = state.pending_txs.get_mut(index) else {
        return;
    };
    pending.submitted_tx = Some(tx_id.to_string());
    let ids = pending.coin_ids();

    if let Purpose::Issue { path, .. } = &pending.purpose {
        let color = color_id(tx_id);
        log::info!("Issued color {} at {}", color, path);
        state.issued_colors.insert(path.clone(), color);
    }
    state.coins.mark_broadcast(&ids, tx_id);
}
