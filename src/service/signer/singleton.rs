//! 单私钥钱包签名：同一个密钥作为所有链的唯一地址

use ethers::types::{transaction::eip2718::TypedTransaction, Bytes};

use super::{sign_evm_with_key, Keychain};
use crate::{
    domain::{
        derivation::{single_key, DerivedKey, KeySource},
        transaction::{SignedTx, UnsignedTx},
    },
    error::{WalletError, WalletResult},
};

pub struct SingletonSigner {
    key: DerivedKey,
    evm_chain_id: u64,
}

impl SingletonSigner {
    pub fn new(private_key: &[u8], evm_chain_id: u64) -> WalletResult<Self> {
        Ok(Self {
            key: single_key(private_key)?,
            evm_chain_id,
        })
    }

    /// 十六进制私钥，可带 0x 前缀
    pub fn from_hex(private_key: &str, evm_chain_id: u64) -> WalletResult<Self> {
        let body = private_key.trim().trim_start_matches("0x");
        let bytes = zeroize::Zeroizing::new(
            hex::decode(body).map_err(|e| WalletError::signing(format!("invalid key hex: {}", e)))?,
        );
        Self::new(&bytes, evm_chain_id)
    }

    pub fn private_key_hex(&self) -> Option<zeroize::Zeroizing<String>> {
        self.key
            .signing_key()
            .map(|k| zeroize::Zeroizing::new(hex::encode(k.to_bytes())))
    }

    pub fn key_source(&self) -> KeySource {
        KeySource::Single(self.key.clone())
    }

    pub fn evm_key(&self) -> &DerivedKey {
        &self.key
    }

    pub fn sign(&self, tx: &UnsignedTx) -> WalletResult<SignedTx> {
        Keychain::new([&self.key]).sign(tx)
    }

    pub fn sign_evm_native(&self, tx: &TypedTransaction) -> WalletResult<Bytes> {
        let key = self
            .key
            .signing_key()
            .ok_or_else(|| WalletError::signing("private key unavailable"))?;
        sign_evm_with_key(key, tx, self.evm_chain_id)
    }
}
