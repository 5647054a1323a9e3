//! 硬件签名设备
//!
//! 两种签名模式：
//! 1. 结构化签名：设备解析并展示交易，按路径返回签名
//! 2. 摘要签名：只发送 SHA-256 摘要，设备回显实际签名的摘要
//!
//! 两种模式下回显摘要都必须与本地摘要一致，否则直接中止，绝不接受签名

use std::{collections::BTreeMap, sync::Arc};

use ethers::types::{transaction::eip2718::TypedTransaction, Bytes};

use super::KeyContext;
use crate::{
    domain::{
        chain_config::{Branch, ChainAlias, TxKind, AVAX_ACCOUNT_PATH, EVM_ACCOUNT_PATH},
        derivation::{AccountXpub, DerivedKey, HdPath, KeyHash, KeySource},
        transaction::{Credential, SignedTx, UnsignedTx},
    },
    error::{DerivationError, TransportError, WalletError, WalletResult},
    service::chain_client::{AppVersion, HardwareTransport},
};

/// 支持结构化签名的最低固件版本
pub const STRUCTURED_SIGNING_MIN_VERSION: AppVersion = AppVersion::new(0, 3, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    Structured,
    Hash,
}

pub struct HardwareSigner {
    transport: Arc<dyn HardwareTransport>,
    avax_xpub: AccountXpub,
    evm_key: DerivedKey,
    /// None 表示设备不支持版本查询（旧固件）
    app_version: Option<AppVersion>,
    evm_chain_id: u64,
}

impl HardwareSigner {
    /// 连接设备：探测能力并读取账户扩展公钥
    pub async fn connect(
        transport: Arc<dyn HardwareTransport>,
        evm_chain_id: u64,
    ) -> WalletResult<Self> {
        let app_version = match transport.app_configuration().await {
            Ok(version) => Some(version),
            // 旧固件不认识该指令：能力为否，不是错误
            Err(TransportError::UnsupportedInstruction) => None,
            Err(e) => return Err(e.into()),
        };

        let avax = transport.get_extended_public_key(AVAX_ACCOUNT_PATH).await?;
        let avax_xpub = AccountXpub::from_parts(&avax.public_key, avax.chain_code)?;

        let evm = transport.get_extended_public_key(EVM_ACCOUNT_PATH).await?;
        let evm_key = AccountXpub::from_parts(&evm.public_key, evm.chain_code)?
            .derive(HdPath::new(Branch::External, 0))?;

        tracing::info!(
            app_version = ?app_version,
            structured = app_version.is_some_and(|v| v >= STRUCTURED_SIGNING_MIN_VERSION),
            "hardware signer connected"
        );

        Ok(Self {
            transport,
            avax_xpub,
            evm_key,
            app_version,
            evm_chain_id,
        })
    }

    pub fn app_version(&self) -> Option<AppVersion> {
        self.app_version
    }

    pub fn key_source(&self) -> KeySource {
        KeySource::Xpub(self.avax_xpub.clone())
    }

    pub fn evm_key(&self) -> &DerivedKey {
        &self.evm_key
    }

    pub fn supports_structured_signing(&self) -> bool {
        self.app_version
            .is_some_and(|v| v >= STRUCTURED_SIGNING_MIN_VERSION)
    }

    /// 设备能解析的交易类型才走结构化签名
    pub fn signing_mode(&self, tx: &UnsignedTx) -> SigningMode {
        let parseable = !matches!(
            tx.kind,
            TxKind::CreateAsset | TxKind::Operation | TxKind::CreateSubnet
        );
        if parseable && self.supports_structured_signing() {
            SigningMode::Structured
        } else {
            SigningMode::Hash
        }
    }

    /// 所有者 → 路径后缀；任一所有者不在已知地址列表中即为致命错误
    fn resolve_paths(
        &self,
        tx: &UnsignedTx,
        ctx: &KeyContext,
    ) -> WalletResult<(&'static str, BTreeMap<KeyHash, (String, DerivedKey)>)> {
        let (account_path, known): (&'static str, Vec<&DerivedKey>) = match tx.chain {
            ChainAlias::C => (EVM_ACCOUNT_PATH, vec![&self.evm_key]),
            _ => (
                AVAX_ACCOUNT_PATH,
                ctx.external
                    .iter()
                    .chain(ctx.internal.iter())
                    .chain(ctx.platform.iter())
                    .collect(),
            ),
        };

        let mut paths = BTreeMap::new();
        for owner in tx.signers() {
            let key = known
                .iter()
                .find(|k| k.hash == owner)
                .ok_or_else(|| DerivationError::UnknownAddress(owner.to_string()))?;
            paths.insert(owner, (key.path.suffix(), (*key).clone()));
        }

        Ok((account_path, paths))
    }

    /// 找零路径提示：只对没有歧义的交易类型发送
    fn change_path(&self, tx: &UnsignedTx, ctx: &KeyContext) -> Option<String> {
        if !tx.kind.supports_change_hint() {
            return None;
        }
        let owner = tx.change_owner?;
        ctx.external
            .iter()
            .chain(ctx.internal.iter())
            .chain(ctx.platform.iter())
            .find(|k| k.hash == owner)
            .map(|k| k.path.suffix())
    }

    pub async fn sign(&self, tx: &UnsignedTx, ctx: &KeyContext) -> WalletResult<SignedTx> {
        let (account_path, paths) = self.resolve_paths(tx, ctx)?;

        let mut suffixes: Vec<String> = paths.values().map(|(s, _)| s.clone()).collect();
        suffixes.sort();
        suffixes.dedup();

        let digest = tx.digest();
        let mode = self.signing_mode(tx);

        tracing::debug!(
            chain = %tx.chain,
            kind = ?tx.kind,
            mode = ?mode,
            paths = suffixes.len(),
            "requesting hardware signature"
        );

        let response = match mode {
            SigningMode::Structured => {
                let change = self.change_path(tx, ctx);
                self.transport
                    .sign_structured(account_path, &suffixes, &tx.bytes, change.as_deref())
                    .await?
            }
            SigningMode::Hash => {
                self.transport
                    .sign_hash(account_path, &suffixes, &digest)
                    .await?
            }
        };

        if response.hash != digest {
            tracing::error!(
                expected = %hex::encode(digest),
                actual = %hex::encode(response.hash),
                "device signed a different digest"
            );
            return Err(WalletError::DigestMismatch {
                expected: hex::encode(digest),
                actual: hex::encode(response.hash),
            });
        }

        // 每个签名必须能恢复出对应路径的公钥
        let mut by_owner = BTreeMap::new();
        for (owner, (suffix, key)) in &paths {
            let signature = response.signatures.get(suffix).ok_or_else(|| {
                WalletError::signing(format!("device returned no signature for {}", suffix))
            })?;
            if signature.recover(&digest)? != key.public_key {
                return Err(WalletError::signing(format!(
                    "device signature for {} does not match its public key",
                    suffix
                )));
            }
            by_owner.insert(*owner, *signature);
        }

        let credentials = tx
            .inputs
            .iter()
            .map(|input| Credential {
                signatures: input
                    .owners
                    .iter()
                    .filter_map(|o| by_owner.get(o).copied())
                    .collect(),
            })
            .collect();

        Ok(SignedTx {
            unsigned: tx.clone(),
            credentials,
        })
    }

    pub async fn sign_evm_native(&self, tx: &TypedTransaction) -> WalletResult<Bytes> {
        let mut tx = tx.clone();
        if tx.chain_id().is_none() {
            tx.set_chain_id(self.evm_chain_id);
        }

        let path = format!("{}/{}", EVM_ACCOUNT_PATH, self.evm_key.path.suffix());
        let signature = self
            .transport
            .sign_evm_transaction(&path, tx.rlp().as_ref())
            .await?;

        Ok(tx.rlp_signed(&signature))
    }
}
