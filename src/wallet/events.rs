//! Structured wallet events
//!
//! Emitted by the negotiator, collector, broadcaster and sync engine.

use serde::Serialize;

use super::signing_ops::SigningState;
use crate::storage::models::{CoinId, CoinStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WalletEvent {
    /// A pending transaction was appended; `kind` is "issue" or "transfer"
    TransactionNegotiated {
        index: usize,
        kind: String,
        inputs: usize,
    },
    TransactionSigned {
        index: usize,
        state: SigningState,
        outstanding: usize,
    },
    TransactionBroadcast { tx_id: String },
    CoinDiscovered {
        coin: CoinId,
        color: String,
        owner_id: u32,
        status: CoinStatus,
    },
    SyncAdvanced { records: usize },
}

pub trait WalletObserver: Send + Sync {
    fn on_event(&self, event: &WalletEvent);
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl WalletObserver for LogObserver {
    fn on_event(&self, event: &WalletEvent) {
        match event {
            WalletEvent::TransactionNegotiated {
                index,
                kind,
                inputs,
            } => log::info!(
                "Negotiated {} transaction #{} with {} input(s)",
                kind,
                index,
                inputs
            ),
            WalletEvent::TransactionSigned {
                index,
                state,
                outstanding,
            } => log::info!(
                "Transaction #{} is {:?} ({} signature(s) outstanding)",
                index,
                state,
                outstanding
            ),
            WalletEvent::TransactionBroadcast { tx_id } => {
                log::info!("Broadcast transaction {}", tx_id)
            }
            WalletEvent::CoinDiscovered {
                coin,
                color,
                owner_id,
                status,
            } => log::info!(
                "Discovered coin {} color '{}' owner {} ({})",
                coin,
                color,
                owner_id,
                status
            ),
            WalletEvent::SyncAdvanced { records } => {
                log::debug!("Sync processed {} record(s)", records)
            }
        }
    }
}
