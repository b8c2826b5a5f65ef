//! Common test utilities for wallet integration tests
//!
//! - `MockNetwork`: in-memory transaction + monitoring service building real
//!   bitcoin transactions, with mining and failure switches
//! - `TestEnvironment`: temp storage, manager wired to the mock, a recording observer

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::address::NetworkUnchecked;
use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::transaction::{OutPoint, Sequence, Version};
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, Address, Amount, Network, PubkeyHash, ScriptBuf, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use cc_wallet::service::{
    ColorValue, ComposedTx, IssuanceRequest, MonitoringLog, MonitoringService, RemoteCoin,
    TransactionService, TransferRequest, TxStateRecord,
};
use cc_wallet::storage::models::{CoinStatus, SyncCursor};
use cc_wallet::storage::{Storage, WalletState};
use cc_wallet::wallet::{WalletEvent, WalletObserver};
use cc_wallet::{
    BitcoinCodec, CommandOutput, WalletCommand, WalletConfig, WalletError, WalletManager,
};

/// Flat fee charged by the mock on issuance
pub const ISSUE_FEE: u64 = 1_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Mock network
// ============================================================================

enum ColorPlan {
    Issue { amount: u64 },
    Transfer(BTreeMap<u32, ColorValue>),
}

#[derive(Default)]
struct Group {
    addresses: BTreeSet<String>,
    txs: BTreeSet<String>,
    log: Vec<TxStateRecord>,
}

struct MockState {
    network: Network,
    txs: BTreeMap<String, Transaction>,
    status: BTreeMap<String, (CoinStatus, Option<u64>)>,
    colors: BTreeMap<String, BTreeMap<u32, ColorValue>>,
    /// Keyed by spent outpoints: signing changes a legacy txid
    plans: Vec<(Vec<OutPoint>, ColorPlan)>,
    groups: BTreeMap<String, Group>,
    height: u64,
    next_id: u64,
    fail_submissions: bool,
    foreign_input: bool,
    /// Successful `fetch_tx` calls left before it starts failing
    fetch_budget: Option<usize>,
}

pub struct MockNetwork {
    inner: Mutex<MockState>,
}

fn service_error(code: u16, message: &str) -> WalletError {
    WalletError::Service {
        status_code: Some(code),
        message: message.to_string(),
    }
}

fn outpoints(tx: &Transaction) -> Vec<OutPoint> {
    tx.input.iter().map(|i| i.previous_output).collect()
}

impl MockState {
    fn script_for(&self, address: &str) -> Result<ScriptBuf, WalletError> {
        let parsed: Address<NetworkUnchecked> = address
            .parse()
            .map_err(|_| service_error(400, "bad address"))?;
        Ok(parsed.assume_checked().script_pubkey())
    }

    fn address_of(&self, script: &ScriptBuf) -> Option<String> {
        Address::from_script(script, self.network)
            .ok()
            .map(|a| a.to_string())
    }

    fn input_for(coin: &RemoteCoin) -> Result<TxIn, WalletError> {
        Ok(TxIn {
            previous_output: OutPoint {
                txid: Txid::from_str(&coin.tx_id).map_err(|_| service_error(400, "bad txid"))?,
                vout: coin.out_index,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
    }

    fn record_tx(&mut self, tx: Transaction, colors: BTreeMap<u32, ColorValue>) -> String {
        let tx_id = tx.compute_txid().to_string();
        self.txs.insert(tx_id.clone(), tx);
        self.colors.insert(tx_id.clone(), colors);
        self.status
            .insert(tx_id.clone(), (CoinStatus::Unconfirmed, None));
        self.notify(&tx_id);
        tx_id
    }

    fn notify(&mut self, tx_id: &str) {
        let addresses: Vec<String> = match self.txs.get(tx_id) {
            Some(tx) => tx
                .output
                .iter()
                .filter_map(|o| self.address_of(&o.script_pubkey))
                .collect(),
            None => return,
        };
        let (status, block_height) = self
            .status
            .get(tx_id)
            .copied()
            .unwrap_or((CoinStatus::Unknown, None));

        for group in self.groups.values_mut() {
            if group.txs.contains(tx_id) || addresses.iter().any(|a| group.addresses.contains(a)) {
                group.log.push(TxStateRecord {
                    tx_id: tx_id.to_string(),
                    status,
                    block_height,
                });
            }
        }
    }

    fn spent_outpoints(&self) -> BTreeSet<OutPoint> {
        self.txs.values().flat_map(outpoints).collect()
    }

    fn remote_coins<F>(&self, unspent_only: bool, keep: F) -> Vec<RemoteCoin>
    where
        F: Fn(&RemoteCoin) -> bool,
    {
        let spent = self.spent_outpoints();
        let mut coins = Vec::new();
        for (tx_id, tx) in &self.txs {
            let colors = self.colors.get(tx_id);
            for (index, output) in tx.output.iter().enumerate() {
                let outpoint = OutPoint {
                    txid: tx.compute_txid(),
                    vout: index as u32,
                };
                if unspent_only && spent.contains(&outpoint) {
                    continue;
                }
                let (color, color_value) = colors
                    .and_then(|c| c.get(&(index as u32)))
                    .map(|cv| (cv.color.clone(), cv.value))
                    .unwrap_or_else(|| (String::new(), output.value.to_sat()));
                let coin = RemoteCoin {
                    tx_id: tx_id.clone(),
                    out_index: index as u32,
                    value: output.value.to_sat(),
                    color,
                    color_value,
                    script: hex::encode(output.script_pubkey.as_bytes()),
                    address: self.address_of(&output.script_pubkey).unwrap_or_default(),
                };
                if keep(&coin) {
                    coins.push(coin);
                }
            }
        }
        coins
    }
}

impl MockNetwork {
    pub fn new(network: Network) -> Self {
        Self {
            inner: Mutex::new(MockState {
                network,
                txs: BTreeMap::new(),
                status: BTreeMap::new(),
                colors: BTreeMap::new(),
                plans: Vec::new(),
                groups: BTreeMap::new(),
                height: 100,
                next_id: 1,
                fail_submissions: false,
                foreign_input: false,
                fetch_budget: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    /// Pay `value` sats to `address` from outside the wallet.
    pub fn fund(&self, address: &str, value: u64) -> String {
        self.fund_outputs(address, value, None)
    }

    /// Like `fund`, with a second output paying an address nobody monitors.
    pub fn fund_with_foreign_output(&self, address: &str, value: u64, foreign: u64) -> String {
        self.fund_outputs(address, value, Some(foreign))
    }

    fn fund_outputs(&self, address: &str, value: u64, foreign: Option<u64>) -> String {
        let mut st = self.lock();
        let source = format!("{:064x}", st.next_id);
        st.next_id += 1;
        let mut tx = Transaction {
            version: Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_str(&source).unwrap(),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: st.script_for(address).unwrap(),
            }],
        };
        if let Some(foreign) = foreign {
            tx.output.push(TxOut {
                value: Amount::from_sat(foreign),
                script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([7u8; 20])),
            });
        }
        st.record_tx(tx, BTreeMap::new())
    }

    /// Confirm every unconfirmed transaction in a new block.
    pub fn mine(&self) -> u64 {
        let mut st = self.lock();
        st.height += 1;
        let height = st.height;
        let pending: Vec<String> = st
            .status
            .iter()
            .filter(|(_, (status, _))| *status == CoinStatus::Unconfirmed)
            .map(|(tx_id, _)| tx_id.clone())
            .collect();
        for tx_id in pending {
            st.status
                .insert(tx_id.clone(), (CoinStatus::Confirmed, Some(height)));
            st.notify(&tx_id);
        }
        height
    }

    pub fn set_fail_submissions(&self, fail: bool) {
        self.lock().fail_submissions = fail;
    }

    /// Let `fetch_tx` succeed `budget` more times, then answer 503. `None` lifts the limit.
    pub fn limit_fetches(&self, budget: Option<usize>) {
        self.lock().fetch_budget = budget;
    }

    /// Make the composer report an input the wallet never offered.
    pub fn set_foreign_input(&self, enabled: bool) {
        self.lock().foreign_input = enabled;
    }

    pub fn tx_count(&self) -> usize {
        self.lock().txs.len()
    }
}

#[async_trait]
impl TransactionService for MockNetwork {
    async fn create_issuance(&self, request: &IssuanceRequest) -> Result<ComposedTx, WalletError> {
        let mut st = self.lock();
        let needed = request.target.value + ISSUE_FEE;

        let mut chosen = Vec::new();
        let mut total = 0;
        for coin in &request.source_coins {
            if total >= needed {
                break;
            }
            total += coin.value;
            chosen.push(coin.clone());
        }
        if total < needed {
            return Err(service_error(400, "insufficient funds"));
        }

        let mut output = vec![TxOut {
            value: Amount::from_sat(request.target.value),
            script_pubkey: st.script_for(&request.target.address)?,
        }];
        if total > needed {
            output.push(TxOut {
                value: Amount::from_sat(total - needed),
                script_pubkey: st.script_for(&request.change_address)?,
            });
        }
        let tx = Transaction {
            version: Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input: chosen
                .iter()
                .map(MockState::input_for)
                .collect::<Result<Vec<_>, _>>()?,
            output,
        };

        st.plans.push((
            outpoints(&tx),
            ColorPlan::Issue {
                amount: request.target.value,
            },
        ));
        if st.foreign_input {
            chosen.push(RemoteCoin {
                tx_id: "ff".repeat(32),
                out_index: 7,
                value: 1,
                color: String::new(),
                color_value: 1,
                script: String::new(),
                address: String::new(),
            });
        }
        Ok(ComposedTx {
            tx: serialize_hex(&tx),
            input_coins: chosen,
        })
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ComposedTx, WalletError> {
        let mut st = self.lock();
        let mut plan = BTreeMap::new();
        let mut output = Vec::new();
        for target in &request.targets {
            plan.insert(
                output.len() as u32,
                ColorValue {
                    color: target.color.clone(),
                    value: target.value,
                },
            );
            output.push(TxOut {
                value: Amount::from_sat(target.value),
                script_pubkey: st.script_for(&target.address)?,
            });
        }

        let mut chosen = Vec::new();
        for (color, coins) in &request.source_coins {
            let needed: u64 = request
                .targets
                .iter()
                .filter(|t| &t.color == color)
                .map(|t| t.value)
                .sum();
            let mut total = 0;
            for coin in coins {
                if total >= needed {
                    break;
                }
                total += coin.color_value;
                chosen.push(coin.clone());
            }
            if total < needed {
                return Err(service_error(400, "insufficient colored funds"));
            }
            if total > needed {
                let change = request
                    .change_address
                    .get(color)
                    .ok_or_else(|| service_error(400, "missing change address"))?;
                plan.insert(
                    output.len() as u32,
                    ColorValue {
                        color: color.clone(),
                        value: total - needed,
                    },
                );
                output.push(TxOut {
                    value: Amount::from_sat(total - needed),
                    script_pubkey: st.script_for(change)?,
                });
            }
        }

        let tx = Transaction {
            version: Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input: chosen
                .iter()
                .map(MockState::input_for)
                .collect::<Result<Vec<_>, _>>()?,
            output,
        };
        st.plans.push((outpoints(&tx), ColorPlan::Transfer(plan)));
        Ok(ComposedTx {
            tx: serialize_hex(&tx),
            input_coins: chosen,
        })
    }

    async fn submit(&self, tx_hex: &str) -> Result<(), WalletError> {
        let mut st = self.lock();
        if st.fail_submissions {
            return Err(service_error(503, "broadcast unavailable"));
        }
        let bytes = hex::decode(tx_hex).map_err(|_| service_error(400, "bad hex"))?;
        let tx: Transaction = deserialize(&bytes).map_err(|_| service_error(400, "bad tx"))?;
        if tx.input.iter().any(|i| i.script_sig.is_empty()) {
            return Err(service_error(400, "unsigned input"));
        }

        let tx_id = tx.compute_txid().to_string();
        let key = outpoints(&tx);
        let planned = st.plans.iter().position(|(k, _)| *k == key);
        let colors = match planned {
            Some(pos) => match st.plans.remove(pos).1 {
                ColorPlan::Issue { amount } => BTreeMap::from([(
                    0,
                    ColorValue {
                        color: format!("epobc:{}:0:0", tx_id),
                        value: amount,
                    },
                )]),
                ColorPlan::Transfer(plan) => plan,
            },
            None => BTreeMap::new(),
        };
        st.record_tx(tx, colors);
        Ok(())
    }

    async fn fetch_tx(&self, tx_id: &str) -> Result<String, WalletError> {
        let mut st = self.lock();
        match st.fetch_budget {
            Some(0) => return Err(service_error(503, "transaction lookup unavailable")),
            Some(left) => st.fetch_budget = Some(left - 1),
            None => {}
        }
        st.txs
            .get(tx_id)
            .map(|tx| serialize_hex(tx))
            .ok_or_else(|| service_error(404, "unknown transaction"))
    }

    async fn fetch_color_values(
        &self,
        tx_id: &str,
    ) -> Result<BTreeMap<u32, ColorValue>, WalletError> {
        Ok(self.lock().colors.get(tx_id).cloned().unwrap_or_default())
    }

    async fn query_unspent(
        &self,
        addresses: &[String],
        color: &str,
    ) -> Result<Vec<RemoteCoin>, WalletError> {
        let st = self.lock();
        Ok(st.remote_coins(true, |c| c.color == color && addresses.contains(&c.address)))
    }

    async fn query_all_colored(
        &self,
        color: &str,
        unspent_only: bool,
    ) -> Result<Vec<RemoteCoin>, WalletError> {
        let st = self.lock();
        Ok(st.remote_coins(unspent_only, |c| c.color == color))
    }
}

#[async_trait]
impl MonitoringService for MockNetwork {
    async fn create_group(&self) -> Result<String, WalletError> {
        let mut st = self.lock();
        let group_id = format!("group-{}", st.next_id);
        st.next_id += 1;
        st.groups.insert(group_id.clone(), Group::default());
        Ok(group_id)
    }

    async fn add_address(&self, group_id: &str, address: &str) -> Result<(), WalletError> {
        let mut st = self.lock();
        let group = st
            .groups
            .get_mut(group_id)
            .ok_or_else(|| service_error(404, "unknown group"))?;
        group.addresses.insert(address.to_string());
        Ok(())
    }

    async fn add_transaction(&self, group_id: &str, tx_id: &str) -> Result<(), WalletError> {
        let mut st = self.lock();
        let group = st
            .groups
            .get_mut(group_id)
            .ok_or_else(|| service_error(404, "unknown group"))?;
        group.txs.insert(tx_id.to_string());
        Ok(())
    }

    async fn poll_log(
        &self,
        group_id: &str,
        cursor: Option<&SyncCursor>,
    ) -> Result<MonitoringLog, WalletError> {
        let st = self.lock();
        let group = st
            .groups
            .get(group_id)
            .ok_or_else(|| service_error(404, "unknown group"))?;
        let start = cursor
            .and_then(|c| c.0.as_u64())
            .unwrap_or(0)
            .min(group.log.len() as u64) as usize;
        Ok(MonitoringLog {
            last_point: Some(SyncCursor(json!(group.log.len()))),
            tx_states: group.log[start..].to_vec(),
        })
    }
}

// ============================================================================
// Test environment
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<WalletEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<WalletEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl WalletObserver for RecordingObserver {
    fn on_event(&self, event: &WalletEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Test environment with automatic cleanup
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub network: Arc<MockNetwork>,
    pub observer: Arc<RecordingObserver>,
    pub manager: WalletManager<BitcoinCodec>,
    pub wallet: String,
}

impl TestEnvironment {
    pub fn new(test_name: &str) -> anyhow::Result<Self> {
        init_logging();
        let temp_dir = TempDir::new()?;
        log::info!("Test directory: {:?}", temp_dir.path());

        let config = WalletConfig {
            bitcoin_network: Network::Testnet,
            wallet_dir: temp_dir.path().to_path_buf(),
            ..WalletConfig::default()
        };
        let storage = Storage::new_with_base_dir(temp_dir.path().to_path_buf());
        let network = Arc::new(MockNetwork::new(Network::Testnet));
        let observer = Arc::new(RecordingObserver::default());

        let manager = WalletManager::with_services(
            config,
            storage,
            network.clone(),
            network.clone(),
            BitcoinCodec::new(Network::Testnet),
        )
        .with_observer(observer.clone());

        Ok(Self {
            temp_dir,
            network,
            observer,
            manager,
            wallet: format!("test-{}", test_name),
        })
    }

    pub async fn run(&self, command: WalletCommand) -> Result<CommandOutput, WalletError> {
        self.manager.execute(&self.wallet, command).await
    }

    pub fn state(&self) -> WalletState {
        self.manager.load(&self.wallet).unwrap()
    }

    pub fn save(&self, state: &WalletState) {
        self.manager.storage.save_state(&self.wallet, state).unwrap();
    }

    /// Generate the wallet, fund one funding address with `value` and sync it confirmed.
    pub async fn funded_wallet(&self, value: u64) -> anyhow::Result<String> {
        self.run(WalletCommand::Generate).await?;
        let address = match self.run(WalletCommand::ShowFundingAddresses).await? {
            CommandOutput::FundingAddresses { new_address, .. } => new_address,
            other => anyhow::bail!("unexpected output {:?}", other),
        };
        self.network.fund(&address, value);
        self.network.mine();
        self.run(WalletCommand::Sync).await?;
        Ok(address)
    }

    /// Sign with every key, broadcast, mine and sync.
    pub async fn settle_pending(&self) -> anyhow::Result<Vec<String>> {
        self.run(WalletCommand::SignPendingTxs { participants: None })
            .await?;
        let tx_ids = match self.run(WalletCommand::BroadcastTxs).await? {
            CommandOutput::Broadcast { tx_ids, .. } => tx_ids,
            other => anyhow::bail!("unexpected output {:?}", other),
        };
        self.network.mine();
        self.run(WalletCommand::Sync).await?;
        Ok(tx_ids)
    }
}
