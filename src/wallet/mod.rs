//! Wallet Core Module
//!
//! Coin-commitment and transaction-lifecycle state machine:
//!
//! - `address_ops.rs` - Path allocation and address registration
//! - `ledger.rs` - Coin inventory with commitment tracking
//! - `negotiation_ops.rs` - Issuance/transfer negotiation with the transaction service
//! - `signing_ops.rs` - Signature collection across participants
//! - `broadcast_ops.rs` - Finalization and broadcast
//! - `sync_ops.rs` - Incremental sync against the monitoring log
//! - `events.rs` - Observer interface
//! - `manager.rs` - Orchestrator for all wallet commands

// Operation modules
pub mod address_ops;
pub mod broadcast_ops;
pub mod ledger;
pub mod negotiation_ops;
pub mod signing_ops;
pub mod sync_ops;

pub mod events;

// Main manager (orchestrator)
pub mod manager;

use crate::codec::SigningProvider;
use crate::service::{MonitoringService, TransactionService};

pub use events::{LogObserver, WalletEvent, WalletObserver};
pub use manager::{CommandOutput, WalletCommand, WalletManager};

/// Collaborators borrowed for the duration of one operation.
pub struct WalletContext<'a, P: SigningProvider> {
    pub tx_service: &'a dyn TransactionService,
    pub monitoring: &'a dyn MonitoringService,
    pub codec: &'a P,
    pub observer: &'a dyn WalletObserver,
}

impl<'a, P: SigningProvider> WalletContext<'a, P> {
    pub fn emit(&self, event: WalletEvent) {
        self.observer.on_event(&event);
    }
}
