//! Remote collaborators
//!
//! - `TransactionService` composes, colors and broadcasts transactions
//! - `MonitoringService` watches addresses/transactions and serves a status log
//!
//! Both are capabilities the wallet core holds by reference; the HTTP
//! implementations share one `ServiceClient`.

mod client;
mod http;
pub mod types;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::WalletError;
use crate::storage::models::SyncCursor;

pub use client::ServiceClient;
pub use http::{HttpMonitoringService, HttpTransactionService};
pub use types::*;

#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn create_issuance(&self, request: &IssuanceRequest) -> Result<ComposedTx, WalletError>;

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ComposedTx, WalletError>;

    async fn submit(&self, tx_hex: &str) -> Result<(), WalletError>;

    async fn fetch_tx(&self, tx_id: &str) -> Result<String, WalletError>;

    /// Output index -> color assignment; uncolored outputs are absent
    async fn fetch_color_values(
        &self,
        tx_id: &str,
    ) -> Result<BTreeMap<u32, ColorValue>, WalletError>;

    async fn query_unspent(
        &self,
        addresses: &[String],
        color: &str,
    ) -> Result<Vec<RemoteCoin>, WalletError>;

    async fn query_all_colored(
        &self,
        color: &str,
        unspent_only: bool,
    ) -> Result<Vec<RemoteCoin>, WalletError>;
}

#[async_trait]
pub trait MonitoringService: Send + Sync {
    async fn create_group(&self) -> Result<String, WalletError>;

    async fn add_address(&self, group_id: &str, address: &str) -> Result<(), WalletError>;

    async fn add_transaction(&self, group_id: &str, tx_id: &str) -> Result<(), WalletError>;

    async fn poll_log(
        &self,
        group_id: &str,
        cursor: Option<&SyncCursor>,
    ) -> Result<MonitoringLog, WalletError>;
}
