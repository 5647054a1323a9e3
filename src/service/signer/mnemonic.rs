//! 助记词软件钱包签名

use ethers::types::{transaction::eip2718::TypedTransaction, Bytes};
use zeroize::Zeroizing;

use super::{sign_evm_with_key, KeyContext, Keychain};
use crate::{
    domain::{
        chain_config::ChainAlias,
        derivation::{DerivedKey, KeySource, MnemonicKeys},
        transaction::{SignedTx, UnsignedTx},
    },
    error::{WalletError, WalletResult},
};

pub struct MnemonicSigner {
    phrase: Zeroizing<String>,
    keys: MnemonicKeys,
    evm_chain_id: u64,
}

impl MnemonicSigner {
    pub fn new(phrase: &str, evm_chain_id: u64) -> WalletResult<Self> {
        let keys = MnemonicKeys::from_phrase(phrase)?;
        Ok(Self {
            phrase: Zeroizing::new(phrase.trim().to_string()),
            keys,
            evm_chain_id,
        })
    }

    /// 用于重新加密到 keystore
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn key_source(&self) -> KeySource {
        KeySource::Hd(self.keys.avax.clone())
    }

    pub fn evm_key(&self) -> &DerivedKey {
        &self.keys.evm
    }

    /// X: 外部 ∪ 内部；P: 平台；C: 固定 EVM 密钥
    pub fn sign(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        let keychain = match tx.chain {
            ChainAlias::C => Keychain::new([&self.keys.evm]),
            chain => Keychain::new(ctx.keys_for(chain)),
        };

        tracing::trace!(chain = %tx.chain, keys = keychain.len(), "mnemonic keychain built");
        keychain.sign(tx)
    }

    pub fn sign_evm_native(&self, tx: &TypedTransaction) -> WalletResult<Bytes> {
        let key = self
            .keys
            .evm
            .signing_key()
            .ok_or_else(|| WalletError::signing("evm key unavailable"))?;
        sign_evm_with_key(key, tx, self.evm_chain_id)
    }
}
