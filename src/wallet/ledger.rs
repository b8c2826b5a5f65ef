//! Coin ledger
//!
//! Every coin the wallet has ever discovered, keyed by (txId, outIndex).
//! Coins are never deleted; a commitment excludes a coin from selection and
//! `Spent` marks the end of its life.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::WalletError;
use crate::storage::models::{Coin, CoinId, CoinStatus, Commitment, Purpose};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinLedger {
    coins: Vec<Coin>,
}

impl CoinLedger {
    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn get(&self, id: &CoinId) -> Option<&Coin> {
        self.coins
            .iter()
            .find(|c| c.tx_id == id.tx_id && c.out_index == id.out_index)
    }

    fn get_mut(&mut self, id: &CoinId) -> Option<&mut Coin> {
        self.coins
            .iter_mut()
            .find(|c| c.tx_id == id.tx_id && c.out_index == id.out_index)
    }

    /// Insert a new coin, or refresh status/height of a known one.
    ///
    /// Returns true when the coin was new.
    pub fn record_discovered(&mut self, coin: Coin) -> bool {
        match self.get_mut(&coin.id()) {
            Some(existing) => {
                if existing.status != CoinStatus::Spent {
                    existing.status = coin.status;
                }
                if coin.block_height.is_some() {
                    existing.block_height = coin.block_height;
                }
                false
            }
            None => {
                self.coins.push(coin);
                true
            }
        }
    }

    /// Apply a status change to every coin created by `tx_id`.
    pub fn update_status(
        &mut self,
        tx_id: &str,
        status: CoinStatus,
        block_height: Option<u64>,
    ) -> usize {
        let mut updated = 0;
        for coin in self.coins.iter_mut().filter(|c| c.tx_id == tx_id) {
            if coin.status != CoinStatus::Spent {
                coin.status = status;
            }
            if block_height.is_some() {
                coin.block_height = block_height;
            }
            updated += 1;
        }
        updated
    }

    /// Free coins of `color` owned by `owner_id`, in ledger order.
    pub fn select(&self, color: &str, owner_id: u32) -> Vec<Coin> {
        self.coins
            .iter()
            .filter(|c| {
                c.color == color
                    && c.owner_id == owner_id
                    && c.commitment.is_none()
                    && !matches!(c.status, CoinStatus::Spent | CoinStatus::Invalid)
            })
            .cloned()
            .collect()
    }

    /// Reserve `ids` for `purpose`; all or nothing.
    pub fn commit(&mut self, ids: &[CoinId], purpose: &Purpose) -> Result<(), WalletError> {
        let mut seen = BTreeSet::new();
        for id in ids {
            let free = self.get(id).map_or(false, |c| c.commitment.is_none());
            if !free || !seen.insert(id) {
                return Err(WalletError::CoinNotFound(id.to_string()));
            }
        }

        for id in ids {
            if let Some(coin) = self.get_mut(id) {
                coin.commitment = Some(Commitment {
                    purpose: purpose.clone(),
                    spending_tx: None,
                });
            }
        }
        log::debug!("Committed {} coin(s)", ids.len());
        Ok(())
    }

    /// Clear commitments of coins whose spend was never broadcast.
    pub fn release(&mut self, ids: &[CoinId]) -> usize {
        let mut released = 0;
        for id in ids {
            if let Some(coin) = self.get_mut(id) {
                let broadcast = coin
                    .commitment
                    .as_ref()
                    .map_or(false, |c| c.spending_tx.is_some());
                if coin.commitment.is_some() && !broadcast {
                    coin.commitment = None;
                    released += 1;
                } else if broadcast {
                    log::warn!("Not releasing {}: its spend was already broadcast", id);
                }
            }
        }
        released
    }

    /// Record which transaction spends the committed `ids`.
    pub fn mark_broadcast(&mut self, ids: &[CoinId], tx_id: &str) {
        for id in ids {
            if let Some(commitment) = self.get_mut(id).and_then(|c| c.commitment.as_mut()) {
                commitment.spending_tx = Some(tx_id.to_string());
            }
        }
    }

    /// Coins spent by `tx_id` become `Spent` once it confirms.
    pub fn settle_spends(&mut self, tx_id: &str, status: CoinStatus) -> usize {
        if status != CoinStatus::Confirmed {
            return 0;
        }
        let mut settled = 0;
        for coin in self.coins.iter_mut() {
            let spent_here = coin
                .commitment
                .as_ref()
                .and_then(|c| c.spending_tx.as_deref())
                == Some(tx_id);
            if spent_here && coin.status != CoinStatus::Spent {
                coin.status = CoinStatus::Spent;
                settled += 1;
            }
        }
        settled
    }
}
