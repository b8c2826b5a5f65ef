//! Wallet configuration from environment variables
//!
//! Controls Bitcoin network type, the colored-coin service endpoint and
//! where wallet state files live. Defaults to Testnet.

use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Bitcoin network used for key derivation and address encoding
    pub bitcoin_network: bitcoin::Network,
    /// Base URL of the transaction + monitoring service (with trailing slash)
    pub service_url: String,
    /// Directory holding one JSON state file per wallet
    pub wallet_dir: PathBuf,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BITCOIN_NETWORK`: "testnet" (default), "regtest", "signet" or "bitcoin"
    /// - `SERVICE_URL`: transaction service endpoint (default `http://localhost:4444/api/`)
    /// - `WALLET_DIR`: state directory (default `./wallets`)
    pub fn from_env() -> Self {
        let network_str = env::var("BITCOIN_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .to_lowercase();

        let bitcoin_network = match network_str.as_str() {
            "regtest" => bitcoin::Network::Regtest,
            "signet" => bitcoin::Network::Signet,
            "bitcoin" | "mainnet" => bitcoin::Network::Bitcoin,
            "testnet" | "" => bitcoin::Network::Testnet,
            other => {
                log::warn!("Unknown network '{}', defaulting to Testnet", other);
                bitcoin::Network::Testnet
            }
        };
        log::info!("Using {:?} network", bitcoin_network);

        let mut service_url =
            env::var("SERVICE_URL").unwrap_or_else(|_| "http://localhost:4444/api/".to_string());
        if !service_url.ends_with('/') {
            service_url.push('/');
        }
        log::info!("Service URL: {}", service_url);

        let wallet_dir = env::var("WALLET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./wallets"));

        Self {
            bitcoin_network,
            service_url,
            wallet_dir,
        }
    }

    /// Short lowercase network name stored in wallet metadata
    pub fn network_name(&self) -> String {
        self.bitcoin_network.to_string()
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            bitcoin_network: bitcoin::Network::Testnet,
            service_url: "http://localhost:4444/api/".to_string(),
            wallet_dir: PathBuf::from("./wallets"),
        }
    }
}
