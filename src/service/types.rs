// Transaction and monitoring service request/response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::models::{Coin, CoinId, CoinStatus, SyncCursor, TransferTarget};

/// Coin as exchanged with the transaction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCoin {
    pub tx_id: String,
    pub out_index: u32,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub color_value: u64,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub address: String,
}

impl RemoteCoin {
    pub fn id(&self) -> CoinId {
        CoinId {
            tx_id: self.tx_id.clone(),
            out_index: self.out_index,
        }
    }
}

impl From<&Coin> for RemoteCoin {
    fn from(coin: &Coin) -> Self {
        Self {
            tx_id: coin.tx_id.clone(),
            out_index: coin.out_index,
            value: coin.value,
            color: coin.color.clone(),
            color_value: coin.color_value,
            script: coin.script.clone(),
            address: coin.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceTarget {
    pub address: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRequest {
    pub target: IssuanceTarget,
    pub source_coins: Vec<RemoteCoin>,
    pub change_address: String,
    /// Coloring kernel, e.g. "epobc"
    pub kernel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub targets: Vec<TransferTarget>,
    /// Color -> candidate coins
    pub source_coins: BTreeMap<String, Vec<RemoteCoin>>,
    /// Color -> change address
    pub change_address: BTreeMap<String, String>,
}

/// Unsigned transaction plus the inputs the service actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTx {
    pub tx: String,
    pub input_coins: Vec<RemoteCoin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorValue {
    pub color: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStateRecord {
    pub tx_id: String,
    pub status: CoinStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringLog {
    pub last_point: Option<SyncCursor>,
    #[serde(default)]
    pub tx_states: Vec<TxStateRecord>,
}

// Wire envelopes

#[derive(Debug, Deserialize)]
pub(crate) struct TxResponse {
    pub tx: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ColorValuesResponse {
    pub color_values: Vec<Option<ColorValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupResponse {
    pub group_id: String,
}
