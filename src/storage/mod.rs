//! Storage and persistence layer
//!
//! - File system operations
//! - Key management
//! - Data models

mod file_system;
mod keys;
pub mod models;

pub use file_system::Storage;
pub use keys::{KeyManager, KeyMaterial, KeyRing};
pub use models::{Metadata, WalletState};
