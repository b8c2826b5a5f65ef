//! Error types for wallet operations
//!
//! Every failure is classified into one of a handful of kinds (see [`ErrorKind`])
//! so callers can tell caller mistakes from local/remote state divergence and
//! from collaborator outages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet already exists: {0}")]
    WalletExists(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("No spendable coins of color '{color}' owned by participant {owner_id}")]
    NoSpendableCoins { color: String, owner_id: u32 },

    #[error("Coin not found or already committed: {0}")]
    CoinNotFound(String),

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Missing multisig descriptor for address {0}")]
    MissingMultisigInfo(String),

    #[error("Transaction still has {outstanding} outstanding signature(s)")]
    IncompleteSignatures { outstanding: usize },

    #[error("Service error (status {status_code:?}): {message}")]
    Service {
        status_code: Option<u16>,
        message: String,
    },

    #[error("Bitcoin error: {0}")]
    Bitcoin(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// Coarse error classes reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller arguments; state untouched.
    Input,
    /// Local and remote state diverged; fatal to the current operation.
    StateConsistency,
    /// Expected waypoint of multi-party signing; more signatures are needed.
    IncompleteSignatures,
    /// A collaborator failed or returned a non-success status.
    Service,
    /// Local I/O, key derivation or codec failure.
    Internal,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::WalletExists(_)
            | WalletError::WalletNotFound(_)
            | WalletError::InvalidInput(_)
            | WalletError::InvalidMnemonic(_)
            | WalletError::NoSpendableCoins { .. } => ErrorKind::Input,
            WalletError::CoinNotFound(_)
            | WalletError::Reconciliation(_)
            | WalletError::MissingMultisigInfo(_) => ErrorKind::StateConsistency,
            WalletError::IncompleteSignatures { .. } => ErrorKind::IncompleteSignatures,
            WalletError::Service { .. } => ErrorKind::Service,
            WalletError::Bitcoin(_) | WalletError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Transport-level failure with no HTTP status.
    pub fn transport(msg: impl Into<String>) -> Self {
        WalletError::Service {
            status_code: None,
            message: msg.into(),
        }
    }

    pub fn bitcoin(err: impl std::fmt::Display) -> Self {
        WalletError::Bitcoin(err.to_string())
    }
}
