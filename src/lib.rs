//! cc-wallet: colored-coin wallet orchestrator
//!
//! Derives deterministic key material, tracks the coins it owns, negotiates
//! transactions with a remote transaction service, collects signatures from
//! one or more key holders and keeps a durable ledger in sync with a
//! monitoring service.
//!
//! # Architecture
//!
//! - **Storage**: one JSON state document per wallet, plus BIP39 key material
//! - **Service**: transaction and monitoring collaborators (HTTP)
//! - **Codec**: key derivation, addresses, transaction decoding and signing
//! - **Wallet**: the commitment/lifecycle state machine and its orchestrator
//!
//! # Example
//!
//! ```ignore
//! use cc_wallet::{WalletCommand, WalletConfig, WalletManager};
//!
//! let manager = WalletManager::new(WalletConfig::from_env());
//! manager.execute("alice", WalletCommand::Generate).await?;
//! manager.execute("alice", WalletCommand::ShowFundingAddresses).await?;
//! manager.execute("alice", WalletCommand::Sync).await?;
//! manager.execute("alice", WalletCommand::IssueCoins { amount: 10_000 }).await?;
//! ```

// Public modules
pub mod codec;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod wallet;

// Re-exports
pub use codec::{BitcoinCodec, SigningProvider};
pub use config::WalletConfig;
pub use error::{ErrorKind, StorageError, WalletError};
pub use wallet::{CommandOutput, WalletCommand, WalletManager};
