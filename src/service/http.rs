use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::client::ServiceClient;
use super::types::*;
use super::{MonitoringService, TransactionService};
use crate::error::WalletError;
use crate::storage::models::SyncCursor;

/// Transaction service over HTTP
#[derive(Clone)]
pub struct HttpTransactionService {
    client: ServiceClient,
}

impl HttpTransactionService {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionService for HttpTransactionService {
    async fn create_issuance(&self, request: &IssuanceRequest) -> Result<ComposedTx, WalletError> {
        self.client.post("createIssueTx", request).await
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ComposedTx, WalletError> {
        self.client.post("createTransferTx", request).await
    }

    async fn submit(&self, tx_hex: &str) -> Result<(), WalletError> {
        let _: Value = self
            .client
            .post("broadcastTx", &json!({ "tx": tx_hex }))
            .await?;
        Ok(())
    }

    async fn fetch_tx(&self, tx_id: &str) -> Result<String, WalletError> {
        let response: TxResponse = self
            .client
            .get("getTx", &[("txId", tx_id.to_string())])
            .await?;
        Ok(response.tx)
    }

    async fn fetch_color_values(
        &self,
        tx_id: &str,
    ) -> Result<BTreeMap<u32, ColorValue>, WalletError> {
        let response: ColorValuesResponse = self
            .client
            .post("getTxColorValues", &json!({ "txId": tx_id }))
            .await?;

        Ok(response
            .color_values
            .into_iter()
            .enumerate()
            .filter_map(|(idx, cv)| cv.map(|cv| (idx as u32, cv)))
            .collect())
    }

    async fn query_unspent(
        &self,
        addresses: &[String],
        color: &str,
    ) -> Result<Vec<RemoteCoin>, WalletError> {
        self.client
            .post(
                "getUnspentCoins",
                &json!({ "addresses": addresses, "color": color }),
            )
            .await
    }

    async fn query_all_colored(
        &self,
        color: &str,
        unspent_only: bool,
    ) -> Result<Vec<RemoteCoin>, WalletError> {
        self.client
            .get(
                "getAllColoredCoins",
                &[
                    ("color", color.to_string()),
                    ("unspent", unspent_only.to_string()),
                ],
            )
            .await
    }
}

/// Monitoring service ("tsm") over HTTP
#[derive(Clone)]
pub struct HttpMonitoringService {
    client: ServiceClient,
}

impl HttpMonitoringService {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MonitoringService for HttpMonitoringService {
    async fn create_group(&self) -> Result<String, WalletError> {
        let response: GroupResponse = self
            .client
            .post("tsm/newMonitoringGroup", &json!({}))
            .await?;
        Ok(response.group_id)
    }

    async fn add_address(&self, group_id: &str, address: &str) -> Result<(), WalletError> {
        let _: Value = self
            .client
            .post(
                "tsm/addAddress",
                &json!({ "groupId": group_id, "address": address }),
            )
            .await?;
        Ok(())
    }

    async fn add_transaction(&self, group_id: &str, tx_id: &str) -> Result<(), WalletError> {
        let _: Value = self
            .client
            .post("tsm/addTx", &json!({ "groupId": group_id, "txId": tx_id }))
            .await?;
        Ok(())
    }

    async fn poll_log(
        &self,
        group_id: &str,
        cursor: Option<&SyncCursor>,
    ) -> Result<MonitoringLog, WalletError> {
        self.client
            .post(
                "tsm/getLog",
                &json!({ "groupId": group_id, "fromPoint": cursor }),
            )
            .await
    }
}
