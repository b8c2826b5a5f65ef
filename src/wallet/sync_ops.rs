//! Synchronization operations
//!
//! Pulls one batch from the monitoring log and folds it into the coin ledger.
//! A transaction's outputs are derived once, on first sight; later records
//! for the same transaction only move status and height.

use serde::Serialize;

use super::events::WalletEvent;
use super::WalletContext;
use crate::codec::SigningProvider;
use crate::error::WalletError;
use crate::service::TxStateRecord;
use crate::storage::models::{Coin, WalletState};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub records: usize,
    /// Coins inserted into the ledger
    pub discovered: usize,
    /// Coins whose status was refreshed
    pub updated: usize,
    /// Coins that became spent
    pub settled: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.records += other.records;
        self.discovered += other.discovered;
        self.updated += other.updated;
        self.settled += other.settled;
    }
}

/// Process one batch of the monitoring log and advance the cursor past it.
///
/// The batch is applied to a working copy; on error `state` is untouched,
/// cursor included, so the next call replays the whole batch.
pub async fn sync<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
) -> Result<SyncReport, WalletError> {
    let batch = ctx
        .monitoring
        .poll_log(&state.monitoring_group, state.last_point.as_ref())
        .await?;
    log::info!(
        "Monitoring log returned {} record(s)",
        batch.tx_states.len()
    );

    let mut working = state.clone();
    let mut report = SyncReport::default();
    for record in &batch.tx_states {
        report.absorb(process_record(&mut working, ctx, record).await?);
    }

    // an empty batch may omit the cursor; keep ours then
    if batch.last_point.is_some() {
        working.last_point = batch.last_point;
    }
    *state = working;

    ctx.emit(WalletEvent::SyncAdvanced {
        records: report.records,
    });
    Ok(report)
}

/// Apply one transaction-state record to the ledger.
///
/// Also the path the broadcaster feeds its own "unconfirmed" record through.
pub async fn process_record<P: SigningProvider>(
    state: &mut WalletState,
    ctx: &WalletContext<'_, P>,
    record: &TxStateRecord,
) -> Result<SyncReport, WalletError> {
    log::info!("Transaction {} is {}", record.tx_id, record.status);
    let mut report = SyncReport {
        records: 1,
        ..SyncReport::default()
    };

    if state.tx_ids.contains(&record.tx_id) {
        report.updated = state
            .coins
            .update_status(&record.tx_id, record.status, record.block_height);
    } else {
        let tx_hex = ctx.tx_service.fetch_tx(&record.tx_id).await?;
        let color_values = ctx.tx_service.fetch_color_values(&record.tx_id).await?;
        let outputs = ctx.codec.output_coins(&tx_hex)?;

        for output in outputs {
            if output.tx_id != record.tx_id {
                return Err(WalletError::Reconciliation(format!(
                    "body fetched for {} decodes as {}",
                    record.tx_id, output.tx_id
                )));
            }
            let Some(address) = output.address else {
                continue;
            };
            let Some(address_record) = state.known_addresses.get(&address) else {
                log::debug!(
                    "Output {}:{} pays unknown address {}",
                    output.tx_id,
                    output.out_index,
                    address
                );
                continue;
            };

            let multisig = if address_record.is_shared() {
                let descriptor = state
                    .multisig
                    .get(&address)
                    .cloned()
                    .ok_or_else(|| WalletError::MissingMultisigInfo(address.clone()))?;
                Some(descriptor)
            } else {
                None
            };
            let (color, color_value) = match color_values.get(&output.out_index) {
                Some(cv) => (cv.color.clone(), cv.value),
                None => (String::new(), output.value),
            };

            let coin = Coin {
                tx_id: output.tx_id,
                out_index: output.out_index,
                value: output.value,
                color,
                color_value,
                script: output.script,
                address,
                owner_id: address_record.owner_id(),
                status: record.status,
                block_height: record.block_height,
                multisig,
                commitment: None,
            };
            let event = WalletEvent::CoinDiscovered {
                coin: coin.id(),
                color: coin.color.clone(),
                owner_id: coin.owner_id,
                status: coin.status,
            };
            if state.coins.record_discovered(coin) {
                report.discovered += 1;
                ctx.emit(event);
            }
        }
        state.tx_ids.insert(record.tx_id.clone());
    }

    report.settled = state.coins.settle_spends(&record.tx_id, record.status);
    if report.settled > 0 {
        log::info!(
            "{} coin(s) spent by {} are now settled",
            report.settled,
            record.tx_id
        );
    }
    Ok(report)
}
