//! Signing and transaction codec provider
//!
//! Key derivation, address encoding, transaction decoding and signing live
//! behind `SigningProvider`. The wallet core only moves opaque hex strings
//! and `SignatureData` records around.

mod bitcoin_codec;

pub use bitcoin_codec::{BitcoinCodec, DecodedTx};

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::storage::models::{MultisigDescriptor, SignatureData};
use crate::storage::KeyMaterial;

/// An input being spent, with what is needed to rebuild its spend script.
#[derive(Debug, Clone)]
pub struct SpendInput {
    pub tx_id: String,
    pub out_index: u32,
    pub value: u64,
    /// Hex-encoded previous output script
    pub script: String,
    pub address: String,
    pub multisig: Option<MultisigDescriptor>,
}

/// One output of a transaction, as seen by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputCoin {
    pub tx_id: String,
    pub out_index: u32,
    pub value: u64,
    pub script: String,
    /// None for outputs without a standard address (e.g. OP_RETURN)
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedTx {
    pub tx_id: String,
    pub tx: String,
}

pub trait SigningProvider {
    /// Transaction annotated with the spend scripts of its inputs
    type Decoded;

    /// `inputs` must follow the transaction's input order.
    fn decode(&self, tx_hex: &str, inputs: &[SpendInput]) -> Result<Self::Decoded, WalletError>;

    /// Ok(None) when `key` at `path` is not a signer of input `input_index`.
    fn sign(
        &self,
        decoded: &Self::Decoded,
        key: &KeyMaterial,
        path: &str,
        input_index: usize,
    ) -> Result<Option<SignatureData>, WalletError>;

    fn apply_signature(
        &self,
        decoded: &mut Self::Decoded,
        signature: &SignatureData,
    ) -> Result<(), WalletError>;

    fn is_fully_signed(&self, decoded: &Self::Decoded) -> bool;

    fn finalize(&self, decoded: &Self::Decoded) -> Result<FinalizedTx, WalletError>;

    fn derive_address(&self, key: &KeyMaterial, path: &str) -> Result<String, WalletError>;

    fn derive_public_key(&self, key: &KeyMaterial, path: &str) -> Result<String, WalletError>;

    fn make_shared_address(
        &self,
        public_keys: &[String],
        threshold: usize,
    ) -> Result<String, WalletError>;

    fn output_coins(&self, tx_hex: &str) -> Result<Vec<OutputCoin>, WalletError>;
}
