//! 密钥派生与地址编码
//!
//! 纯函数：助记词 / 账户扩展公钥 → 指定索引的密钥对与各链地址。
//! 软件钱包持有私钥；硬件钱包只持有公钥，签名在设备内完成。

use std::fmt;

use bech32::{Bech32, Hrp};
use bip39::{Language, Mnemonic};
use bitcoin::hashes::{hash160, Hash};
use coins_bip32::{path::DerivationPath, prelude::*};
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::{
    domain::chain_config::{Branch, ChainAlias, AVAX_ACCOUNT_PATH, EVM_ACCOUNT_PATH},
    error::{DerivationError, WalletError},
};

const HARDENED: u32 = 0x8000_0000;

/// 20 字节地址哈希 (hash160 of compressed public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyHash(pub [u8; 20]);

impl KeyHash {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let encoded = public_key.to_encoded_point(true);
        Self(hash160::Hash::hash(encoded.as_bytes()).to_byte_array())
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// 链上地址（X / P / C 原子交易地址）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainAddress {
    pub chain: ChainAlias,
    pub hash: KeyHash,
    pub encoded: String,
}

impl ChainAddress {
    pub fn new(chain: ChainAlias, hrp: &str, hash: KeyHash) -> Result<Self, WalletError> {
        let encoded = encode_address(chain, hrp, &hash)?;
        Ok(Self {
            chain,
            hash,
            encoded,
        })
    }

    /// 同一密钥在另一条链上的地址
    pub fn on_chain(&self, chain: ChainAlias, hrp: &str) -> Result<Self, WalletError> {
        Self::new(chain, hrp, self.hash)
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// 分支内的派生位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HdPath {
    pub branch: Branch,
    pub index: u32,
}

impl HdPath {
    pub fn new(branch: Branch, index: u32) -> Self {
        Self { branch, index }
    }

    /// 相对账户的路径后缀，如 `0/5`
    pub fn suffix(&self) -> String {
        format!("{}/{}", self.branch.index(), self.index)
    }
}

/// 派生结果
#[derive(Clone)]
pub struct DerivedKey {
    pub path: HdPath,
    pub public_key: PublicKey,
    pub hash: KeyHash,
    signing_key: Option<SigningKey>,
}

impl DerivedKey {
    fn new(path: HdPath, public_key: PublicKey, signing_key: Option<SigningKey>) -> Self {
        Self {
            path,
            hash: KeyHash::from_public_key(&public_key),
            public_key,
            signing_key,
        }
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    pub fn address(&self, chain: ChainAlias, hrp: &str) -> Result<ChainAddress, WalletError> {
        ChainAddress::new(chain, hrp, self.hash)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("path", &self.path)
            .field("hash", &self.hash)
            .field("has_private_key", &self.signing_key.is_some())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 扩展公钥（硬件钱包 / 只读派生）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 账户级扩展公钥，只支持非硬化子派生 (BIP32 CKDpub)
#[derive(Debug, Clone, PartialEq)]
pub struct AccountXpub {
    xpub: XPub,
}

impl AccountXpub {
    /// 由设备返回的压缩公钥与链码构造，深度按账户层 (m/44'/coin'/0') 记
    pub fn from_parts(public_key: &[u8], chain_code: [u8; 32]) -> Result<Self, DerivationError> {
        let key = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
        let info = XKeyInfo {
            depth: 3,
            parent: KeyFingerprint::from([0u8; 4]),
            index: HARDENED,
            chain_code: ChainCode::from(chain_code),
            hint: Hint::Legacy,
        };
        Ok(Self {
            xpub: XPub::new(key, info),
        })
    }

    /// 从种子沿硬化路径计算账户扩展公钥
    pub fn from_seed(seed: &[u8], account_path: &str) -> Result<Self, DerivationError> {
        let account = HdAccount::from_seed(seed, account_path)?;
        Ok(Self {
            xpub: account.account.verify_key(),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        let key: &VerifyingKey = self.xpub.as_ref();
        PublicKey::from(key)
    }

    pub fn chain_code(&self) -> [u8; 32] {
        let info: &XKeyInfo = self.xpub.as_ref();
        info.chain_code.0
    }

    pub fn derive_child(&self, index: u32) -> Result<Self, DerivationError> {
        let xpub = self.xpub.derive_child(index).map_err(|e| match e {
            Bip32Error::HardenedDerivationFailed => {
                DerivationError::InvalidPath("hardened derivation needs a private key".into())
            }
            other => DerivationError::Bip32(other.to_string()),
        })?;
        Ok(Self { xpub })
    }

    pub fn derive(&self, path: HdPath) -> Result<DerivedKey, DerivationError> {
        let leaf = self
            .derive_child(path.branch.index())?
            .derive_child(path.index)?;
        Ok(DerivedKey::new(path, leaf.public_key(), None))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 软件 HD 账户
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 助记词派生出的账户私钥
#[derive(Clone)]
pub struct HdAccount {
    account: XPriv,
}

impl HdAccount {
    pub fn from_seed(seed: &[u8], account_path: &str) -> Result<Self, DerivationError> {
        let path = account_path
            .parse::<DerivationPath>()
            .map_err(|e| DerivationError::InvalidPath(e.to_string()))?;

        let master_key = XPriv::root_from_seed(seed, None)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;

        let account = master_key
            .derive_path(&path)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;

        Ok(Self { account })
    }

    pub fn derive(&self, path: HdPath) -> Result<DerivedKey, DerivationError> {
        let leaf = self
            .account
            .derive_child(path.branch.index())
            .and_then(|branch| branch.derive_child(path.index))
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &SigningKey = leaf.as_ref();
        let public_key = PublicKey::from(signing_key.verifying_key());

        Ok(DerivedKey::new(path, public_key, Some(signing_key.clone())))
    }
}

/// 解析并校验 BIP39 助记词
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, DerivationError> {
    Mnemonic::parse_in(Language::English, phrase.trim())
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))
}

pub fn mnemonic_seed(phrase: &str) -> Result<Zeroizing<[u8; 64]>, DerivationError> {
    let mnemonic = parse_mnemonic(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

/// 助记词派生出的全部软件密钥材料
pub struct MnemonicKeys {
    pub avax: HdAccount,
    /// C-Chain 固定路径 m/44'/60'/0'/0/0
    pub evm: DerivedKey,
}

impl MnemonicKeys {
    pub fn from_phrase(phrase: &str) -> Result<Self, DerivationError> {
        let seed = mnemonic_seed(phrase)?;
        let avax = HdAccount::from_seed(seed.as_ref(), AVAX_ACCOUNT_PATH)?;
        let evm = HdAccount::from_seed(seed.as_ref(), EVM_ACCOUNT_PATH)?
            .derive(HdPath::new(Branch::External, 0))?;
        Ok(Self { avax, evm })
    }
}

/// 单私钥（非 HD）
pub fn single_key(private_key: &[u8]) -> Result<DerivedKey, DerivationError> {
    let signing_key = SigningKey::from_slice(private_key)
        .map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
    let public_key = PublicKey::from(signing_key.verifying_key());
    Ok(DerivedKey::new(
        HdPath::new(Branch::External, 0),
        public_key,
        Some(signing_key),
    ))
}

/// 密钥来源：地址扫描器通过它按索引派生
#[derive(Clone)]
pub enum KeySource {
    Hd(HdAccount),
    Xpub(AccountXpub),
    Single(DerivedKey),
}

impl KeySource {
    pub fn derive(&self, path: HdPath) -> Result<DerivedKey, DerivationError> {
        match self {
            Self::Hd(account) => account.derive(path),
            Self::Xpub(xpub) => xpub.derive(path),
            Self::Single(key) => Ok(key.clone()),
        }
    }

    pub fn is_hd(&self) -> bool {
        !matches!(self, Self::Single(_))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 地址编码
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `X-avax1...`
pub fn encode_address(chain: ChainAlias, hrp: &str, hash: &KeyHash) -> Result<String, WalletError> {
    let hrp = Hrp::parse(hrp).map_err(|e| WalletError::InvalidAddress(format!("hrp: {}", e)))?;
    let body = bech32::encode::<Bech32>(hrp, &hash.0)
        .map_err(|e| WalletError::InvalidAddress(format!("bech32: {}", e)))?;
    Ok(format!("{}-{}", chain, body))
}

/// 解析 `X-avax1...`，返回 (链, hrp, 哈希)
pub fn decode_address(address: &str) -> Result<(ChainAlias, String, KeyHash), WalletError> {
    let (alias, body) = address
        .split_once('-')
        .ok_or_else(|| WalletError::InvalidAddress(address.to_string()))?;
    let chain: ChainAlias = alias
        .parse()
        .map_err(|_| WalletError::InvalidAddress(address.to_string()))?;

    let (hrp, data) = bech32::decode(body)
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))?;

    let bytes: [u8; 20] = data
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::InvalidAddress(format!("{}: bad length", address)))?;

    Ok((chain, hrp.to_string(), KeyHash(bytes)))
}

/// EVM 地址：keccak256(未压缩公钥去前缀) 后 20 字节
pub fn evm_address(public_key: &PublicKey) -> String {
    let uncompressed = public_key.to_encoded_point(false);
    let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

pub fn parse_evm_address(address: &str) -> Result<[u8; 20], WalletError> {
    let body = address
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidAddress(address.to_string()))?;
    let bytes = hex::decode(body).map_err(|e| WalletError::InvalidAddress(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::InvalidAddress(format!("{}: bad length", address)))
}
