use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{ecdsa, All, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Address, Network, PublicKey, Transaction};
use std::str::FromStr;

use super::{FinalizedTx, OutputCoin, SigningProvider, SpendInput};
use crate::error::WalletError;
use crate::storage::models::SignatureData;
use crate::storage::KeyMaterial;

/// Signing provider for legacy P2PKH and P2SH m-of-n multisig spends.
///
/// Keys are BIP32-derived from each participant's seed; signatures are
/// ECDSA over the legacy SIGHASH_ALL digest.
pub struct BitcoinCodec {
    network: Network,
    secp: Secp256k1<All>,
}

/// Transaction plus the spend script and collected signatures of each input.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    tx: Transaction,
    inputs: Vec<DecodedInput>,
}

#[derive(Debug, Clone)]
struct DecodedInput {
    /// Previous script for P2PKH, redeem script for P2SH
    script_code: ScriptBuf,
    kind: SpendKind,
    signatures: Vec<(PublicKey, Vec<u8>)>,
}

#[derive(Debug, Clone)]
enum SpendKind {
    PayToKeyHash,
    Multisig {
        public_keys: Vec<PublicKey>,
        threshold: usize,
    },
}

impl BitcoinCodec {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
        }
    }

    fn derive_key(
        &self,
        key: &KeyMaterial,
        path: &str,
    ) -> Result<(SecretKey, PublicKey), WalletError> {
        let master = Xpriv::new_master(self.network, key.seed()).map_err(WalletError::bitcoin)?;
        let path = DerivationPath::from_str(path).map_err(WalletError::bitcoin)?;
        let child = master
            .derive_priv(&self.secp, &path)
            .map_err(WalletError::bitcoin)?;
        let public_key = PublicKey::from_private_key(&self.secp, &child.to_priv());
        Ok((child.private_key, public_key))
    }

    fn p2pkh_script(&self, public_key: &PublicKey) -> ScriptBuf {
        Address::p2pkh(public_key.pubkey_hash(), self.network).script_pubkey()
    }

    fn sighash(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_code: &ScriptBuf,
    ) -> Result<Message, WalletError> {
        let cache = SighashCache::new(tx);
        let hash = cache
            .legacy_signature_hash(input_index, script_code, EcdsaSighashType::All.to_u32())
            .map_err(WalletError::bitcoin)?;
        Ok(Message::from_digest(hash.to_byte_array()))
    }

    fn is_signer(&self, input: &DecodedInput, public_key: &PublicKey) -> bool {
        match &input.kind {
            SpendKind::PayToKeyHash => self.p2pkh_script(public_key) == input.script_code,
            SpendKind::Multisig { public_keys, .. } => public_keys.contains(public_key),
        }
    }

    fn verify(&self, message: &Message, public_key: &PublicKey, signature: &[u8]) -> bool {
        let Some((_, der)) = signature.split_last() else {
            return false;
        };
        match ecdsa::Signature::from_der(der) {
            Ok(sig) => self
                .secp
                .verify_ecdsa(message, &sig, &public_key.inner)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn parse_public_keys(public_keys: &[String]) -> Result<Vec<PublicKey>, WalletError> {
        public_keys
            .iter()
            .map(|pk| PublicKey::from_str(pk).map_err(WalletError::bitcoin))
            .collect()
    }

    fn multisig_script(
        public_keys: &[PublicKey],
        threshold: usize,
    ) -> Result<ScriptBuf, WalletError> {
        if threshold == 0 || threshold > public_keys.len() || public_keys.len() > 16 {
            return Err(WalletError::InvalidInput(format!(
                "invalid multisig threshold {} of {}",
                threshold,
                public_keys.len()
            )));
        }
        let mut builder = Builder::new().push_int(threshold as i64);
        for pk in public_keys {
            builder = builder.push_key(pk);
        }
        Ok(builder
            .push_int(public_keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script())
    }

    fn push_data(builder: Builder, data: &[u8]) -> Result<Builder, WalletError> {
        let buf = PushBytesBuf::try_from(data.to_vec()).map_err(WalletError::bitcoin)?;
        Ok(builder.push_slice(buf))
    }

    fn script_sig(input: &DecodedInput) -> Result<ScriptBuf, WalletError> {
        match &input.kind {
            SpendKind::PayToKeyHash => {
                let mut builder = Builder::new();
                if let Some((pk, sig)) = input.signatures.first() {
                    builder = Self::push_data(builder, sig)?;
                    builder = Self::push_data(builder, &pk.to_bytes())?;
                }
                Ok(builder.into_script())
            }
            SpendKind::Multisig {
                public_keys,
                threshold,
            } => {
                // OP_CHECKMULTISIG pops one extra element
                let mut builder = Builder::new().push_int(0);
                let ordered = public_keys
                    .iter()
                    .filter_map(|pk| input.signatures.iter().find(|(k, _)| k == pk))
                    .take(*threshold);
                for (_, sig) in ordered {
                    builder = Self::push_data(builder, sig)?;
                }
                builder = Self::push_data(builder, input.script_code.as_bytes())?;
                Ok(builder.into_script())
            }
        }
    }

    fn parse_tx(tx_hex: &str) -> Result<Transaction, WalletError> {
        let bytes = hex::decode(tx_hex).map_err(WalletError::bitcoin)?;
        deserialize(&bytes).map_err(WalletError::bitcoin)
    }
}

impl SigningProvider for BitcoinCodec {
    type Decoded = DecodedTx;

    fn decode(&self, tx_hex: &str, inputs: &[SpendInput]) -> Result<DecodedTx, WalletError> {
        let tx = Self::parse_tx(tx_hex)?;
        if tx.input.len() != inputs.len() {
            return Err(WalletError::Reconciliation(format!(
                "transaction has {} inputs, {} coins supplied",
                tx.input.len(),
                inputs.len()
            )));
        }

        let mut decoded_inputs = Vec::with_capacity(inputs.len());
        for (txin, input) in tx.input.iter().zip(inputs) {
            let outpoint = &txin.previous_output;
            if outpoint.txid.to_string() != input.tx_id || outpoint.vout != input.out_index {
                return Err(WalletError::Reconciliation(format!(
                    "input {} does not match coin {}:{}",
                    outpoint, input.tx_id, input.out_index
                )));
            }

            let prev_script =
                ScriptBuf::from_bytes(hex::decode(&input.script).map_err(WalletError::bitcoin)?);

            let decoded = if prev_script.is_p2pkh() {
                DecodedInput {
                    script_code: prev_script,
                    kind: SpendKind::PayToKeyHash,
                    signatures: Vec::new(),
                }
            } else if prev_script.is_p2sh() {
                let descriptor = input
                    .multisig
                    .as_ref()
                    .ok_or_else(|| WalletError::MissingMultisigInfo(input.address.clone()))?;
                let public_keys = Self::parse_public_keys(&descriptor.public_keys)?;
                let redeem_script = Self::multisig_script(&public_keys, descriptor.threshold)?;
                let expected = Address::p2sh(&redeem_script, self.network)
                    .map_err(WalletError::bitcoin)?
                    .script_pubkey();
                if expected != prev_script {
                    return Err(WalletError::Reconciliation(format!(
                        "multisig descriptor does not match script of {}:{}",
                        input.tx_id, input.out_index
                    )));
                }
                DecodedInput {
                    script_code: redeem_script,
                    kind: SpendKind::Multisig {
                        public_keys,
                        threshold: descriptor.threshold,
                    },
                    signatures: Vec::new(),
                }
            } else {
                return Err(WalletError::Bitcoin(format!(
                    "unsupported script for {}:{}",
                    input.tx_id, input.out_index
                )));
            };
            decoded_inputs.push(decoded);
        }

        Ok(DecodedTx {
            tx,
            inputs: decoded_inputs,
        })
    }

    fn sign(
        &self,
        decoded: &DecodedTx,
        key: &KeyMaterial,
        path: &str,
        input_index: usize,
    ) -> Result<Option<SignatureData>, WalletError> {
        let input = decoded.inputs.get(input_index).ok_or_else(|| {
            WalletError::InvalidInput(format!("input index {} out of range", input_index))
        })?;

        let (secret_key, public_key) = self.derive_key(key, path)?;
        if !self.is_signer(input, &public_key) {
            log::debug!("Key at {} does not sign input {}", path, input_index);
            return Ok(None);
        }

        let message = self.sighash(&decoded.tx, input_index, &input.script_code)?;
        let signature = self.secp.sign_ecdsa(&message, &secret_key);
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(EcdsaSighashType::All.to_u32() as u8);

        Ok(Some(SignatureData {
            input_index,
            public_key: public_key.to_string(),
            signature: hex::encode(bytes),
        }))
    }

    fn apply_signature(
        &self,
        decoded: &mut DecodedTx,
        signature: &SignatureData,
    ) -> Result<(), WalletError> {
        let index = signature.input_index;
        let input = decoded.inputs.get_mut(index).ok_or_else(|| {
            WalletError::InvalidInput(format!("input index {} out of range", index))
        })?;
        let public_key = PublicKey::from_str(&signature.public_key).map_err(WalletError::bitcoin)?;
        let bytes = hex::decode(&signature.signature).map_err(WalletError::bitcoin)?;

        if !input.signatures.iter().any(|(pk, _)| *pk == public_key) {
            input.signatures.push((public_key, bytes));
        }
        decoded.tx.input[index].script_sig = Self::script_sig(input)?;
        Ok(())
    }

    fn is_fully_signed(&self, decoded: &DecodedTx) -> bool {
        decoded.inputs.iter().enumerate().all(|(index, input)| {
            let Ok(message) = self.sighash(&decoded.tx, index, &input.script_code) else {
                return false;
            };
            let required = match &input.kind {
                SpendKind::PayToKeyHash => 1,
                SpendKind::Multisig { threshold, .. } => *threshold,
            };
            let valid = input
                .signatures
                .iter()
                .filter(|(pk, sig)| self.is_signer(input, pk) && self.verify(&message, pk, sig))
                .count();
            valid >= required
        })
    }

    fn finalize(&self, decoded: &DecodedTx) -> Result<FinalizedTx, WalletError> {
        if !self.is_fully_signed(decoded) {
            return Err(WalletError::Bitcoin(
                "transaction is not fully and validly signed".to_string(),
            ));
        }
        Ok(FinalizedTx {
            tx_id: decoded.tx.compute_txid().to_string(),
            tx: serialize_hex(&decoded.tx),
        })
    }

    fn derive_address(&self, key: &KeyMaterial, path: &str) -> Result<String, WalletError> {
        let (_, public_key) = self.derive_key(key, path)?;
        Ok(Address::p2pkh(public_key.pubkey_hash(), self.network).to_string())
    }

    fn derive_public_key(&self, key: &KeyMaterial, path: &str) -> Result<String, WalletError> {
        let (_, public_key) = self.derive_key(key, path)?;
        Ok(public_key.to_string())
    }

    fn make_shared_address(
        &self,
        public_keys: &[String],
        threshold: usize,
    ) -> Result<String, WalletError> {
        let public_keys = Self::parse_public_keys(public_keys)?;
        let redeem_script = Self::multisig_script(&public_keys, threshold)?;
        let address = Address::p2sh(&redeem_script, self.network).map_err(WalletError::bitcoin)?;
        Ok(address.to_string())
    }

    fn output_coins(&self, tx_hex: &str) -> Result<Vec<OutputCoin>, WalletError> {
        let tx = Self::parse_tx(tx_hex)?;
        let tx_id = tx.compute_txid().to_string();

        Ok(tx
            .output
            .iter()
            .enumerate()
            .map(|(index, output)| OutputCoin {
                tx_id: tx_id.clone(),
                out_index: index as u32,
                value: output.value.to_sat(),
                script: hex::encode(output.script_pubkey.as_bytes()),
                address: Address::from_script(&output.script_pubkey, self.network)
                    .ok()
                    .map(|a| a.to_string()),
            })
            .collect())
    }
}
