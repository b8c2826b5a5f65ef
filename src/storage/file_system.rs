use std::fs;
use std::path::PathBuf;

use super::models::WalletState;
use crate::error::StorageError;

/// One JSON state document per wallet, read and rewritten whole on every operation.
#[derive(Clone)]
pub struct Storage {
    base_path: PathBuf,
}

impl Storage {
    /// Create a new storage instance with the default base directory ("./wallets")
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("./wallets"),
        }
    }

    /// Create storage with custom base directory (for testing)
    pub fn new_with_base_dir(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", name))
    }

    /// Check if a wallet with the given name exists
    pub fn wallet_exists(&self, name: &str) -> bool {
        self.state_path(name).exists()
    }

    /// Write the initial state of a new wallet
    pub fn create_wallet(&self, name: &str, state: &WalletState) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        self.save_state(name, state)
    }

    /// Persist wallet state; written to a temporary file first and renamed into place
    pub fn save_state(&self, name: &str, state: &WalletState) -> Result<(), StorageError> {
        let path = self.state_path(name);
        let tmp_path = self.base_path.join(format!(".{}.json.tmp", name));
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        log::debug!("Saved wallet state to {:?}", path);
        Ok(())
    }

    /// Load wallet state from disk
    pub fn load_state(&self, name: &str) -> Result<WalletState, StorageError> {
        let path = self.state_path(name);
        if !path.exists() {
            return Err(StorageError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        let state = serde_json::from_str(&contents)?;
        Ok(state)
    }

    /// List all wallet names in the storage directory
    pub fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut wallets = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                if !name.starts_with('.') {
                    wallets.push(name.to_string());
                }
            }
        }
        wallets.sort();
        Ok(wallets)
    }

    /// Delete a wallet state file
    pub fn delete_wallet(&self, name: &str) -> Result<(), StorageError> {
        let path = self.state_path(name);

        if !path.exists() {
            return Err(StorageError::FileNotFound(path.display().to_string()));
        }

        log::warn!("Deleting wallet state: {:?}", path);
        fs::remove_file(&path)?;
        log::info!("Wallet '{}' deleted successfully", name);

        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}
