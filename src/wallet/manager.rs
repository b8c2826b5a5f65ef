//! Wallet Manager - Orchestration Layer
//!
//! Every command is one read-modify-write of the wallet's state file: load,
//! run the operation modules against the in-memory state, save on success.
//! A failed command leaves the file as it was.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::address_ops::{
    new_shared_address, new_simple_address, COLORED_PREFIX, FUNDING_PREFIX, ISSUANCE_PREFIX,
};
use super::broadcast_ops::broadcast;
use super::events::{LogObserver, WalletEvent, WalletObserver};
use super::negotiation_ops::{build_issuance, build_transfer};
use super::signing_ops::{sign_pending, signing_state, SigningState};
use super::sync_ops::{sync, SyncReport};
use super::WalletContext;
use crate::codec::{BitcoinCodec, SigningProvider};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::service::{
    HttpMonitoringService, HttpTransactionService, MonitoringService, RemoteCoin, ServiceClient,
    TransactionService,
};
use crate::storage::models::{
    AddressRecord, Coin, CoinStatus, Participant, TransferTarget, LOCAL_PARTICIPANT,
};
use crate::storage::{KeyManager, KeyRing, Metadata, Storage, WalletState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCommand {
    /// Create a wallet with a fresh seed and monitoring group
    Generate,
    /// Allocate a new funding address and list all of them
    ShowFundingAddresses,
    Sync,
    ShowCoins,
    /// Free color value per (color, owner)
    Balance,
    IssueCoins {
        amount: u64,
    },
    /// Sign with every known key, or only with `participants`
    SignPendingTxs {
        participants: Option<Vec<u32>>,
    },
    BroadcastTxs,
    /// Register a secondary party and a 2-of-2 address shared with it
    GenerateUser,
    /// Send `amount` of the latest issued color to every secondary party
    DistributeTokens {
        amount: u64,
    },
    TransferTokens {
        from: u32,
        to: u32,
        amount: u64,
    },
    /// Drop a pending transaction and release its coins
    AbandonPending {
        index: usize,
    },
    ShowUnspent {
        color: String,
    },
    ShowColored {
        color: String,
        unspent_only: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub color: String,
    pub owner_id: u32,
    pub value: u64,
    pub coins: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTx {
    pub index: usize,
    pub state: SigningState,
    pub signed: usize,
    pub outstanding: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum CommandOutput {
    Generated {
        name: String,
        network: String,
        monitoring_group: String,
    },
    FundingAddresses {
        new_address: String,
        addresses: Vec<String>,
    },
    Synced {
        report: SyncReport,
    },
    Coins {
        coins: Vec<Coin>,
    },
    Balance {
        entries: Vec<BalanceEntry>,
    },
    Negotiated {
        index: usize,
        purpose: String,
    },
    Signed {
        transactions: Vec<SignedTx>,
    },
    Broadcast {
        tx_ids: Vec<String>,
        remaining: usize,
    },
    UserCreated {
        participant_id: u32,
        shared_address: String,
    },
    Abandoned {
        released: usize,
    },
    RemoteCoins {
        coins: Vec<RemoteCoin>,
    },
}

pub struct WalletManager<P: SigningProvider> {
    pub config: WalletConfig,
    pub storage: Storage,
    tx_service: Arc<dyn TransactionService>,
    monitoring: Arc<dyn MonitoringService>,
    codec: P,
    observer: Arc<dyn WalletObserver>,
}

impl WalletManager<BitcoinCodec> {
    // ============================================================================
    // Constructor
    // ============================================================================

    /// HTTP collaborators and file storage as configured
    pub fn new(config: WalletConfig) -> Self {
        let client = ServiceClient::new(config.service_url.clone());
        let storage = Storage::new_with_base_dir(config.wallet_dir.clone());
        let codec = BitcoinCodec::new(config.bitcoin_network);

        Self::with_services(
            config,
            storage,
            Arc::new(HttpTransactionService::new(client.clone())),
            Arc::new(HttpMonitoringService::new(client)),
            codec,
        )
    }
}

impl<P: SigningProvider> WalletManager<P> {
    pub fn with_services(
        config: WalletConfig,
        storage: Storage,
        tx_service: Arc<dyn TransactionService>,
        monitoring: Arc<dyn MonitoringService>,
        codec: P,
    ) -> Self {
        Self {
            config,
            storage,
            tx_service,
            monitoring,
            codec,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WalletObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn codec(&self) -> &P {
        &self.codec
    }

    fn ctx(&self) -> WalletContext<'_, P> {
        WalletContext {
            tx_service: self.tx_service.as_ref(),
            monitoring: self.monitoring.as_ref(),
            codec: &self.codec,
            observer: self.observer.as_ref(),
        }
    }

    pub fn load(&self, name: &str) -> Result<WalletState, WalletError> {
        if !self.storage.wallet_exists(name) {
            return Err(WalletError::WalletNotFound(name.to_string()));
        }
        Ok(self.storage.load_state(name)?)
    }

    fn save(&self, name: &str, state: &WalletState) -> Result<(), WalletError> {
        Ok(self.storage.save_state(name, state)?)
    }

    pub async fn execute(
        &self,
        name: &str,
        command: WalletCommand,
    ) -> Result<CommandOutput, WalletError> {
        log::debug!("Running {:?} on wallet '{}'", command, name);
        match command {
            WalletCommand::Generate => self.generate(name).await,
            WalletCommand::ShowFundingAddresses => self.show_funding_addresses(name).await,
            WalletCommand::Sync => self.sync(name).await,
            WalletCommand::ShowCoins => self.show_coins(name),
            WalletCommand::Balance => self.balance(name),
            WalletCommand::IssueCoins { amount } => self.issue_coins(name, amount).await,
            WalletCommand::SignPendingTxs { participants } => {
                self.sign_pending_txs(name, participants.as_deref())
            }
            WalletCommand::BroadcastTxs => self.broadcast_txs(name).await,
            WalletCommand::GenerateUser => self.generate_user(name).await,
            WalletCommand::DistributeTokens { amount } => {
                self.distribute_tokens(name, amount).await
            }
            WalletCommand::TransferTokens { from, to, amount } => {
                self.transfer_tokens(name, from, to, amount).await
            }
            WalletCommand::AbandonPending { index } => self.abandon_pending(name, index),
            WalletCommand::ShowUnspent { color } => self.show_unspent(name, &color).await,
            WalletCommand::ShowColored {
                color,
                unspent_only,
            } => self.show_colored(&color, unspent_only).await,
        }
    }

    // ============================================================================
    // Wallet setup
    // ============================================================================

    pub async fn generate(&self, name: &str) -> Result<CommandOutput, WalletError> {
        if self.storage.wallet_exists(name) {
            return Err(WalletError::WalletExists(name.to_string()));
        }

        let mnemonic = KeyManager::generate()?;
        let monitoring_group = self.monitoring.create_group().await?;
        let metadata = Metadata {
            name: name.to_string(),
            created_at: Utc::now(),
            network: self.config.network_name(),
        };
        let state = WalletState::new(metadata, mnemonic.to_string(), monitoring_group.clone());
        self.storage.create_wallet(name, &state)?;
        log::info!("Wallet '{}' created, monitoring group {}", name, monitoring_group);

        Ok(CommandOutput::Generated {
            name: name.to_string(),
            network: state.metadata.network,
            monitoring_group,
        })
    }

    pub async fn show_funding_addresses(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let key = KeyManager::key_material(&state.seed)?;

        let (new_address, _) =
            new_simple_address(&mut state, &self.ctx(), &key, FUNDING_PREFIX).await?;
        let addresses = state
            .hd_paths
            .issued(FUNDING_PREFIX)
            .iter()
            .map(|path| self.codec.derive_address(&key, path))
            .collect::<Result<Vec<_>, _>>()?;

        self.save(name, &state)?;
        Ok(CommandOutput::FundingAddresses {
            new_address,
            addresses,
        })
    }

    pub async fn generate_user(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let local = KeyManager::key_material(&state.seed)?;
        let mnemonic = KeyManager::generate()?;
        let remote = KeyManager::key_material(&mnemonic.to_string())?;
        let participant_id = state.next_participant_id();

        let (shared_address, _) =
            new_shared_address(&mut state, &self.ctx(), &local, &remote, participant_id).await?;
        state.participants.insert(
            participant_id,
            Participant {
                id: participant_id,
                seed: mnemonic.to_string(),
                shared_address: shared_address.clone(),
                created_at: Utc::now(),
            },
        );

        self.save(name, &state)?;
        Ok(CommandOutput::UserCreated {
            participant_id,
            shared_address,
        })
    }

    // ============================================================================
    // Chain state
    // ============================================================================

    pub async fn sync(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let report = sync(&mut state, &self.ctx()).await?;
        self.save(name, &state)?;
        Ok(CommandOutput::Synced { report })
    }

    pub fn show_coins(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let state = self.load(name)?;
        Ok(CommandOutput::Coins {
            coins: state.coins.coins().to_vec(),
        })
    }

    pub fn balance(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let state = self.load(name)?;

        let mut totals: BTreeMap<(String, u32), (u64, usize)> = BTreeMap::new();
        for coin in state.coins.coins().iter().filter(|c| {
            !c.is_committed() && !matches!(c.status, CoinStatus::Spent | CoinStatus::Invalid)
        }) {
            let entry = totals
                .entry((coin.color.clone(), coin.owner_id))
                .or_default();
            entry.0 += coin.color_value;
            entry.1 += 1;
        }

        let entries = totals
            .into_iter()
            .map(|((color, owner_id), (value, coins))| BalanceEntry {
                color,
                owner_id,
                value,
                coins,
            })
            .collect();
        Ok(CommandOutput::Balance { entries })
    }

    pub async fn show_unspent(&self, name: &str, color: &str) -> Result<CommandOutput, WalletError> {
        let state = self.load(name)?;
        let funding = format!("{}/", FUNDING_PREFIX);
        let addresses: Vec<String> = state
            .known_addresses
            .iter()
            .filter(|(_, record)| {
                matches!(record, AddressRecord::Simple { path } if path.starts_with(&funding))
            })
            .map(|(address, _)| address.clone())
            .collect();

        let coins = self.tx_service.query_unspent(&addresses, color).await?;
        Ok(CommandOutput::RemoteCoins { coins })
    }

    pub async fn show_colored(
        &self,
        color: &str,
        unspent_only: bool,
    ) -> Result<CommandOutput, WalletError> {
        let coins = self.tx_service.query_all_colored(color, unspent_only).await?;
        Ok(CommandOutput::RemoteCoins { coins })
    }

    // ============================================================================
    // Transactions
    // ============================================================================

    /// Issue `amount` of a new color to a fresh issuance address.
    pub async fn issue_coins(&self, name: &str, amount: u64) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let key = KeyManager::key_material(&state.seed)?;
        let ctx = self.ctx();

        let (target, path) = new_simple_address(&mut state, &ctx, &key, ISSUANCE_PREFIX).await?;
        let (change, _) = new_simple_address(&mut state, &ctx, &key, FUNDING_PREFIX).await?;
        let index = build_issuance(&mut state, &ctx, &target, &path, amount, &change).await?;

        self.save(name, &state)?;
        Ok(CommandOutput::Negotiated {
            index,
            purpose: "issue".to_string(),
        })
    }

    pub async fn distribute_tokens(
        &self,
        name: &str,
        amount: u64,
    ) -> Result<CommandOutput, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidInput("amount must be positive".to_string()));
        }
        let mut state = self.load(name)?;
        if state.participants.is_empty() {
            return Err(WalletError::InvalidInput(
                "no secondary users; run generate-user first".to_string(),
            ));
        }
        let color = latest_color(&state)?;
        let key = KeyManager::key_material(&state.seed)?;
        let ctx = self.ctx();

        let targets: Vec<TransferTarget> = state
            .participants
            .values()
            .map(|p| TransferTarget {
                address: p.shared_address.clone(),
                value: amount,
                color: color.clone(),
            })
            .collect();
        let (change, _) = new_simple_address(&mut state, &ctx, &key, COLORED_PREFIX).await?;

        let sources = BTreeMap::from([(color.clone(), LOCAL_PARTICIPANT)]);
        let change_addresses = BTreeMap::from([(color, change)]);
        let index = build_transfer(
            &mut state,
            &ctx,
            targets,
            &sources,
            change_addresses,
            vec![LOCAL_PARTICIPANT],
        )
        .await?;

        self.save(name, &state)?;
        Ok(CommandOutput::Negotiated {
            index,
            purpose: "transfer".to_string(),
        })
    }

    /// Move `amount` of the latest issued color between participants.
    ///
    /// Participant 0 pays from and receives to the wallet's own colored
    /// addresses; any other participant uses its shared address.
    pub async fn transfer_tokens(
        &self,
        name: &str,
        from: u32,
        to: u32,
        amount: u64,
    ) -> Result<CommandOutput, WalletError> {
        if from == to {
            return Err(WalletError::InvalidInput(
                "sender and recipient must differ".to_string(),
            ));
        }
        if amount == 0 {
            return Err(WalletError::InvalidInput("amount must be positive".to_string()));
        }
        let mut state = self.load(name)?;
        let color = latest_color(&state)?;
        let key = KeyManager::key_material(&state.seed)?;
        let ctx = self.ctx();

        let recipient = match to {
            LOCAL_PARTICIPANT => {
                new_simple_address(&mut state, &ctx, &key, COLORED_PREFIX)
                    .await?
                    .0
            }
            id => shared_address_of(&state, id)?,
        };
        let (change, participants) = match from {
            LOCAL_PARTICIPANT => (
                new_simple_address(&mut state, &ctx, &key, COLORED_PREFIX)
                    .await?
                    .0,
                vec![LOCAL_PARTICIPANT],
            ),
            id => (shared_address_of(&state, id)?, vec![LOCAL_PARTICIPANT, id]),
        };

        let targets = vec![TransferTarget {
            address: recipient,
            value: amount,
            color: color.clone(),
        }];
        let sources = BTreeMap::from([(color.clone(), from)]);
        let change_addresses = BTreeMap::from([(color, change)]);
        let index = build_transfer(
            &mut state,
            &ctx,
            targets,
            &sources,
            change_addresses,
            participants,
        )
        .await?;

        self.save(name, &state)?;
        Ok(CommandOutput::Negotiated {
            index,
            purpose: "transfer".to_string(),
        })
    }

    pub fn sign_pending_txs(
        &self,
        name: &str,
        participants: Option<&[u32]>,
    ) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let keys = KeyRing::from_state(&state, participants)?;
        log::info!("Signing with participants {:?}", keys.participants());

        let mut transactions = Vec::with_capacity(state.pending_txs.len());
        for (index, pending) in state.pending_txs.iter_mut().enumerate() {
            let report = sign_pending(pending, &self.codec, &keys, &state.multisig)?;
            self.observer.on_event(&WalletEvent::TransactionSigned {
                index,
                state: report.state,
                outstanding: report.outstanding,
            });
            transactions.push(SignedTx {
                index,
                state: report.state,
                signed: report.signed,
                outstanding: report.outstanding,
            });
        }

        self.save(name, &state)?;
        Ok(CommandOutput::Signed { transactions })
    }

    /// Broadcast every fully signed pending transaction, saving after each.
    pub async fn broadcast_txs(&self, name: &str) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        let ctx = self.ctx();

        let mut tx_ids = Vec::new();
        let mut index = 0;
        while index < state.pending_txs.len() {
            if signing_state(&state.pending_txs[index]) != SigningState::FullySigned {
                log::info!(
                    "Pending transaction #{} still has {} outstanding signature(s)",
                    index,
                    state.pending_txs[index].outstanding_slots()
                );
                index += 1;
                continue;
            }
            // a submission recorded before a later failure must be kept
            let result = broadcast(&mut state, &ctx, index).await;
            self.save(name, &state)?;
            tx_ids.push(result?);
        }

        Ok(CommandOutput::Broadcast {
            tx_ids,
            remaining: state.pending_txs.len(),
        })
    }

    pub fn abandon_pending(&self, name: &str, index: usize) -> Result<CommandOutput, WalletError> {
        let mut state = self.load(name)?;
        if index >= state.pending_txs.len() {
            return Err(WalletError::InvalidInput(format!(
                "no pending transaction #{}",
                index
            )));
        }

        if let Some(tx_id) = &state.pending_txs[index].submitted_tx {
            return Err(WalletError::InvalidInput(format!(
                "pending transaction #{} was already submitted as {}",
                index, tx_id
            )));
        }

        let pending = state.pending_txs.remove(index);
        let released = state.coins.release(&pending.coin_ids());
        log::info!(
            "Abandoned pending transaction #{}, released {} coin(s)",
            index,
            released
        );

        self.save(name, &state)?;
        Ok(CommandOutput::Abandoned { released })
    }
}

/// Color issued at the highest issuance index.
fn latest_color(state: &WalletState) -> Result<String, WalletError> {
    state
        .issued_colors
        .iter()
        .max_by_key(|(path, _)| {
            path.rsplit('/')
                .next()
                .and_then(|index| index.parse::<u64>().ok())
                .unwrap_or(0)
        })
        .map(|(_, color)| color.clone())
        .ok_or_else(|| WalletError::InvalidInput("no color has been issued yet".to_string()))
}

fn shared_address_of(state: &WalletState, participant_id: u32) -> Result<String, WalletError> {
    state
        .participants
        .get(&participant_id)
        .map(|p| p.shared_address.clone())
        .ok_or_else(|| {
            WalletError::InvalidInput(format!("unknown participant {}", participant_id))
        })
}
