//! Data models for wallet storage
//!
//! `WalletState` is the single owner of every other record and is persisted
//! as one JSON document per wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::wallet::address_ops::PathCounters;
use crate::wallet::ledger::CoinLedger;

/// Participant id of the wallet's own key material.
pub const LOCAL_PARTICIPANT: u32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub metadata: Metadata,
    /// BIP39 phrase of participant 0
    pub seed: String,
    pub monitoring_group: String,
    #[serde(default)]
    pub hd_paths: PathCounters,
    #[serde(default)]
    pub known_addresses: BTreeMap<String, AddressRecord>,
    #[serde(default)]
    pub coins: CoinLedger,
    #[serde(default)]
    pub pending_txs: Vec<PendingTransaction>,
    #[serde(default)]
    pub last_point: Option<SyncCursor>,
    #[serde(default)]
    pub tx_ids: BTreeSet<String>,
    /// Secondary parties, keyed by participant id
    #[serde(default)]
    pub participants: BTreeMap<u32, Participant>,
    /// Shared-ownership descriptors, keyed by address
    #[serde(default)]
    pub multisig: BTreeMap<String, MultisigDescriptor>,
    /// Issuance derivation path -> color issued there
    #[serde(default)]
    pub issued_colors: BTreeMap<String, String>,
}

impl WalletState {
    pub fn new(metadata: Metadata, seed: String, monitoring_group: String) -> Self {
        Self {
            metadata,
            seed,
            monitoring_group,
            hd_paths: PathCounters::default(),
            known_addresses: BTreeMap::new(),
            coins: CoinLedger::default(),
            pending_txs: Vec::new(),
            last_point: None,
            tx_ids: BTreeSet::new(),
            participants: BTreeMap::new(),
            multisig: BTreeMap::new(),
            issued_colors: BTreeMap::new(),
        }
    }

    /// Next unused secondary participant id (ids start at 1).
    pub fn next_participant_id(&self) -> u32 {
        self.participants
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(LOCAL_PARTICIPANT + 1)
    }
}

/// A secondary key holder. Held locally only to simulate the remote party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: u32,
    pub seed: String,
    /// First shared address created with this participant
    pub shared_address: String,
    pub created_at: DateTime<Utc>,
}

/// How the wallet owns an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AddressRecord {
    Simple { path: String },
    Shared { path: String, participants: Vec<u32> },
}

impl AddressRecord {
    pub fn path(&self) -> &str {
        match self {
            AddressRecord::Simple { path } | AddressRecord::Shared { path, .. } => path,
        }
    }

    /// Owner of coins at this address: the local wallet for simple addresses,
    /// the remote party for shared ones.
    pub fn owner_id(&self) -> u32 {
        match self {
            AddressRecord::Simple { .. } => LOCAL_PARTICIPANT,
            AddressRecord::Shared { participants, .. } => participants
                .iter()
                .copied()
                .find(|id| *id != LOCAL_PARTICIPANT)
                .unwrap_or(LOCAL_PARTICIPANT),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, AddressRecord::Shared { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigDescriptor {
    /// Hex-encoded public keys, in script order
    pub public_keys: Vec<String>,
    pub threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinStatus {
    Unconfirmed,
    Confirmed,
    Invalid,
    /// Terminal: the spending transaction confirmed
    Spent,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoinStatus::Unconfirmed => "unconfirmed",
            CoinStatus::Confirmed => "confirmed",
            CoinStatus::Invalid => "invalid",
            CoinStatus::Spent => "spent",
            CoinStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// (transactionId, outputIndex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinId {
    pub tx_id: String,
    pub out_index: u32,
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.out_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub tx_id: String,
    pub out_index: u32,
    /// Satoshi value of the output
    pub value: u64,
    /// Empty string for uncolored coins
    pub color: String,
    /// Amount of `color` carried; equals `value` for uncolored coins
    pub color_value: u64,
    /// Hex-encoded output script
    pub script: String,
    pub address: String,
    pub owner_id: u32,
    pub status: CoinStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multisig: Option<MultisigDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Commitment>,
}

impl Coin {
    pub fn id(&self) -> CoinId {
        CoinId {
            tx_id: self.tx_id.clone(),
            out_index: self.out_index,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.commitment.is_some()
    }
}

/// Reservation of a coin by an in-flight transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub purpose: Purpose,
    /// Set once the spending transaction has been broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTarget {
    pub address: String,
    pub value: u64,
    pub color: String,
}

/// Why coins were spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Purpose {
    Issue {
        /// Derivation path of the issuance target
        path: String,
        amount: u64,
    },
    Transfer {
        targets: Vec<TransferTarget>,
        /// Participants whose coins are spent
        participants: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureData {
    pub input_index: usize,
    /// Hex-encoded public key of the signer
    pub public_key: String,
    /// Hex-encoded DER signature with sighash byte
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSlot {
    pub participant_id: u32,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureData>,
}

impl SignatureSlot {
    pub fn outstanding(participant_id: u32, path: impl Into<String>) -> Self {
        Self {
            participant_id,
            path: path.into(),
            signature: None,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.signature.is_some()
    }
}

/// Coin snapshot taken at commit time, plus its signing obligations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedCoin {
    #[serde(flatten)]
    pub coin: Coin,
    pub signatures: Vec<SignatureSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Hex-encoded unsigned transaction
    pub tx: String,
    pub purpose: Purpose,
    /// In transaction input order
    pub coins: Vec<CommittedCoin>,
    pub created_at: DateTime<Utc>,
    /// Set once the network accepted the transaction; it can no longer be abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_tx: Option<String>,
}

impl PendingTransaction {
    pub fn slots(&self) -> impl Iterator<Item = &SignatureSlot> {
        self.coins.iter().flat_map(|c| c.signatures.iter())
    }

    pub fn outstanding_slots(&self) -> usize {
        self.slots().filter(|s| !s.is_filled()).count()
    }

    pub fn coin_ids(&self) -> Vec<CoinId> {
        self.coins.iter().map(|c| c.coin.id()).collect()
    }
}

/// Opaque continuation token of the monitoring log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(pub serde_json::Value);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_owner_is_remote_party() {
        let record = AddressRecord::Shared {
            path: "m/0/3/0".into(),
            participants: vec![0, 2],
        };
        assert_eq!(record.owner_id(), 2);
        assert!(record.is_shared());
        assert_eq!(record.path(), "m/0/3/0");

        let simple = AddressRecord::Simple {
            path: "m/0/0/1".into(),
        };
        assert_eq!(simple.owner_id(), LOCAL_PARTICIPANT);
    }

    #[test]
    fn test_purpose_tagged_by_type() {
        let purpose = Purpose::Issue {
            path: "m/0/1/0".into(),
            amount: 10_000,
        };
        let json = serde_json::to_value(&purpose).unwrap();
        assert_eq!(json["type"], "issue");
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let status: CoinStatus = serde_json::from_str("\"dropped\"").unwrap();
        assert_eq!(status, CoinStatus::Unknown);
        let status: CoinStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(status, CoinStatus::Confirmed);
    }
}
