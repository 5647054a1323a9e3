//! 签名后端
//!
//! 封闭枚举 {Mnemonic, Singleton, Hardware}，钱包构造时确定，静态分发。
//! 每个变体实现 X / P / C 三条链的 UTXO 交易签名与 EVM 原生交易签名。

pub mod hardware;
pub mod mnemonic;
pub mod singleton;

use std::collections::HashMap;

use ethers::types::{transaction::eip2718::TypedTransaction, Bytes};
use k256::ecdsa::SigningKey;

pub use hardware::HardwareSigner;
pub use mnemonic::MnemonicSigner;
pub use singleton::SingletonSigner;

use crate::{
    domain::{
        chain_config::ChainAlias,
        derivation::{DerivedKey, KeyHash, KeySource},
        transaction::{Credential, SignedTx, TxSignature, UnsignedTx},
    },
    error::{DerivationError, WalletError, WalletResult},
};

/// 签名所需的派生上下文，由钱包从扫描器收集（0..=当前索引）
#[derive(Debug, Clone, Default)]
pub struct KeyContext {
    pub external: Vec<DerivedKey>,
    pub internal: Vec<DerivedKey>,
    pub platform: Vec<DerivedKey>,
}

impl KeyContext {
    /// 某条链交易可能涉及的密钥列表
    pub fn keys_for(&self, chain: ChainAlias) -> Vec<&DerivedKey> {
        match chain {
            ChainAlias::X => self.external.iter().chain(self.internal.iter()).collect(),
            ChainAlias::P => self.platform.iter().collect(),
            ChainAlias::C => Vec::new(),
        }
    }
}

/// 软件密钥链：地址哈希 → 私钥
pub(crate) struct Keychain<'a> {
    keys: HashMap<KeyHash, &'a SigningKey>,
}

impl<'a> Keychain<'a> {
    pub(crate) fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a DerivedKey>,
    {
        Self {
            keys: keys
                .into_iter()
                .filter_map(|k| k.signing_key().map(|s| (k.hash, s)))
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// 每个输入用所持有的所有者密钥签名；任何输入无可用密钥即失败
    pub(crate) fn sign(&self, tx: &UnsignedTx) -> WalletResult<SignedTx> {
        let digest = tx.digest();
        let mut credentials = Vec::with_capacity(tx.inputs.len());

        for input in &tx.inputs {
            let signatures = input
                .owners
                .iter()
                .filter_map(|owner| self.keys.get(owner))
                .map(|key| TxSignature::sign(key, &digest))
                .collect::<WalletResult<Vec<_>>>()?;

            if signatures.is_empty() {
                return Err(DerivationError::UnknownAddress(format!(
                    "no key for input {} owners {:?}",
                    input.utxo_id, input.owners
                ))
                .into());
            }
            credentials.push(Credential { signatures });
        }

        Ok(SignedTx {
            unsigned: tx.clone(),
            credentials,
        })
    }
}

/// 软件 EVM 签名，返回带签名的 RLP
pub(crate) fn sign_evm_with_key(
    key: &SigningKey,
    tx: &TypedTransaction,
    chain_id: u64,
) -> WalletResult<Bytes> {
    use ethers::signers::{LocalWallet, Signer};

    let mut tx = tx.clone();
    if tx.chain_id().is_none() {
        tx.set_chain_id(chain_id);
    }

    let wallet = LocalWallet::from(key.clone()).with_chain_id(chain_id);
    let signature = wallet
        .sign_transaction_sync(&tx)
        .map_err(|e| WalletError::signing(e.to_string()))?;

    Ok(tx.rlp_signed(&signature))
}

pub enum SignerBackend {
    Mnemonic(MnemonicSigner),
    Singleton(SingletonSigner),
    Hardware(HardwareSigner),
}

impl SignerBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mnemonic(_) => "mnemonic",
            Self::Singleton(_) => "singleton",
            Self::Hardware(_) => "hardware",
        }
    }

    /// 扫描器使用的密钥来源
    pub fn key_source(&self) -> KeySource {
        match self {
            Self::Mnemonic(s) => s.key_source(),
            Self::Singleton(s) => s.key_source(),
            Self::Hardware(s) => s.key_source(),
        }
    }

    /// C-Chain 固定密钥（硬件钱包只有公钥）
    pub fn evm_key(&self) -> &DerivedKey {
        match self {
            Self::Mnemonic(s) => s.evm_key(),
            Self::Singleton(s) => s.evm_key(),
            Self::Hardware(s) => s.evm_key(),
        }
    }

    pub async fn sign_x(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        ensure_chain(tx, ChainAlias::X)?;
        self.sign_utxo_tx(tx, ctx).await
    }

    pub async fn sign_p(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        ensure_chain(tx, ChainAlias::P)?;
        self.sign_utxo_tx(tx, ctx).await
    }

    /// C-Chain 原子交易（导入/导出）
    pub async fn sign_c(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        ensure_chain(tx, ChainAlias::C)?;
        self.sign_utxo_tx(tx, ctx).await
    }

    /// 按交易所属链分发
    pub async fn sign(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        match tx.chain {
            ChainAlias::X => self.sign_x(tx, ctx).await,
            ChainAlias::P => self.sign_p(tx, ctx).await,
            ChainAlias::C => self.sign_c(tx, ctx).await,
        }
    }

    pub async fn sign_evm_native(&self, tx: &TypedTransaction) -> WalletResult<Bytes> {
        match self {
            Self::Mnemonic(s) => s.sign_evm_native(tx),
            Self::Singleton(s) => s.sign_evm_native(tx),
            Self::Hardware(s) => s.sign_evm_native(tx).await,
        }
    }

    async fn sign_utxo_tx(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        let signed = match self {
            Self::Mnemonic(s) => s.sign(tx, ctx)?,
            Self::Singleton(s) => s.sign(tx)?,
            Self::Hardware(s) => s.sign(tx, ctx).await?,
        };

        tracing::debug!(
            signer = self.kind(),
            chain = %tx.chain,
            kind = ?tx.kind,
            inputs = tx.inputs.len(),
            "transaction signed"
        );
        Ok(signed)
    }
}

fn ensure_chain(tx: &UnsignedTx, expected: ChainAlias) -> WalletResult<()> {
    if tx.chain != expected {
        return Err(WalletError::signing(format!(
            "expected {}-chain transaction, got {}-chain",
            expected, tx.chain
        )));
    }
    Ok(())
}
