//! Keystore 编解码
//!
//! 支持 2.0 ~ 6.0 五个版本，按 `version` 字段分发；写入一律使用 6.0。
//!
//! - 密码密钥：PBKDF2-HMAC-SHA256(SHA-256(password ‖ salt), salt, 迭代次数)
//! - 每个条目独立 12 字节 IV，AES-256-GCM
//! - 二进制字段 CB58 编码（base58 + 4 字节 SHA-256 校验和）
//! - ≤5.0 带 pass_hash，解密前常数时间比较；6.0 以首个条目的认证失败判定密码错误

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    domain::derivation::parse_mnemonic,
    error::{KeystoreError, WalletError, WalletResult},
    infrastructure::{
        encryption::{decrypt_with_iv, encrypt_with_iv, random_iv, EncryptionKey},
        pbkdf2::{derive_password_key, random_salt, CURRENT_ITERATIONS, LEGACY_ITERATIONS},
    },
    service::{signer::SignerBackend, wallet_core::WalletIdentity},
};

pub const CURRENT_VERSION: &str = "6.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum KeystoreVersion {
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl KeystoreVersion {
    fn parse(version: &str) -> Result<Self, KeystoreError> {
        Ok(match version {
            "2.0" => Self::V2,
            "3.0" => Self::V3,
            "4.0" => Self::V4,
            "5.0" => Self::V5,
            "6.0" => Self::V6,
            other => return Err(KeystoreError::UnsupportedVersion(other.to_string())),
        })
    }

    fn iterations(self) -> u32 {
        match self {
            Self::V2 => LEGACY_ITERATIONS,
            _ => CURRENT_ITERATIONS,
        }
    }

    fn has_pass_hash(self) -> bool {
        self <= Self::V5
    }

    /// 2.0 ~ 4.0 存储 BIP39 熵而不是助记词文本
    fn stores_entropy(self) -> bool {
        self <= Self::V4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Mnemonic,
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreEntry {
    pub key: String,
    pub iv: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
}

/// 磁盘上的 keystore 文件，写入后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: String,
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_hash: Option<String>,
    #[serde(rename = "activeIndex", default, skip_serializing_if = "Option::is_none")]
    pub active_index: Option<u32>,
    pub keys: Vec<KeystoreEntry>,
}

/// 明文密钥；助记词为空格分隔的单词，单私钥为十六进制
pub struct DecryptedKey {
    pub key: Zeroizing<String>,
    pub key_type: KeyType,
}

impl DecryptedKey {
    pub fn mnemonic(phrase: &str) -> Self {
        Self {
            key: Zeroizing::new(phrase.trim().to_string()),
            key_type: KeyType::Mnemonic,
        }
    }

    pub fn singleton(private_key_hex: &str) -> Self {
        Self {
            key: Zeroizing::new(private_key_hex.trim().trim_start_matches("0x").to_string()),
            key_type: KeyType::Singleton,
        }
    }

    /// 从签名后端取回可导出的密钥；硬件钱包没有
    pub fn from_signer(signer: &SignerBackend) -> WalletResult<Self> {
        match signer {
            SignerBackend::Mnemonic(s) => Ok(Self::mnemonic(s.phrase())),
            SignerBackend::Singleton(s) => s
                .private_key_hex()
                .map(|hex| Self::singleton(&hex))
                .ok_or_else(|| WalletError::signing("private key unavailable")),
            SignerBackend::Hardware(_) => Err(WalletError::unsupported(
                "hardware wallets cannot be exported to a keystore",
            )),
        }
    }

    pub fn to_identity(&self) -> WalletResult<WalletIdentity> {
        match self.key_type {
            KeyType::Mnemonic => Ok(WalletIdentity::Mnemonic(self.key.clone())),
            KeyType::Singleton => {
                let bytes = hex::decode(self.key.as_str())
                    .map_err(|e| KeystoreError::Malformed(format!("singleton key: {}", e)))?;
                Ok(WalletIdentity::Singleton(Zeroizing::new(bytes)))
            }
        }
    }
}

impl std::fmt::Debug for DecryptedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedKey")
            .field("key", &"<redacted>")
            .field("key_type", &self.key_type)
            .finish()
    }
}

/// 解密结果，释放时清零
#[derive(Debug)]
pub struct DecryptedKeystore {
    pub version: String,
    pub active_index: u32,
    pub keys: Vec<DecryptedKey>,
}

// ============ CB58 ============

pub fn cb58_encode(data: &[u8]) -> String {
    let checksum = Sha256::digest(data);
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum[checksum.len() - 4..]);
    bs58::encode(payload).into_string()
}

pub fn cb58_decode(encoded: &str) -> Result<Vec<u8>, KeystoreError> {
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| KeystoreError::Malformed(format!("invalid base58: {}", e)))?;
    if raw.len() < 4 {
        return Err(KeystoreError::Malformed("cb58 payload too short".into()));
    }

    let (data, checksum) = raw.split_at(raw.len() - 4);
    let expected = Sha256::digest(data);
    if checksum != &expected[expected.len() - 4..] {
        return Err(KeystoreError::Malformed("cb58 checksum mismatch".into()));
    }
    Ok(data.to_vec())
}

fn pass_hash(key: &EncryptionKey, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_slice());
    hasher.update(salt);
    cb58_encode(&hasher.finalize())
}

// ============ 加解密 ============

/// 以当前版本（6.0）加密，每次生成新盐与新 IV
pub fn encrypt(
    password: &str,
    keys: &[DecryptedKey],
    active_index: u32,
) -> WalletResult<KeystoreFile> {
    if keys.is_empty() {
        return Err(KeystoreError::Malformed("keystore needs at least one key".into()).into());
    }

    let salt = random_salt();
    let key = derive_password_key(password, &salt, CURRENT_ITERATIONS);

    let entries = keys
        .iter()
        .map(|k| {
            let iv = random_iv();
            let ciphertext = encrypt_with_iv(k.key.as_bytes(), &key, &iv)?;
            Ok(KeystoreEntry {
                key: cb58_encode(&ciphertext),
                iv: cb58_encode(&iv),
                key_type: Some(k.key_type),
            })
        })
        .collect::<Result<Vec<_>, KeystoreError>>()?;

    tracing::debug!(keys = entries.len(), active_index, "keystore encrypted");

    Ok(KeystoreFile {
        version: CURRENT_VERSION.to_string(),
        salt: cb58_encode(&salt),
        pass_hash: None,
        active_index: Some(active_index),
        keys: entries,
    })
}

pub fn decrypt(file: &KeystoreFile, password: &str) -> WalletResult<DecryptedKeystore> {
    let version = KeystoreVersion::parse(&file.version)?;
    let salt = cb58_decode(&file.salt)?;
    let key = derive_password_key(password, &salt, version.iterations());

    if version.has_pass_hash() {
        let stored = file
            .pass_hash
            .as_deref()
            .ok_or_else(|| KeystoreError::Malformed("missing pass_hash".into()))?;
        let computed = pass_hash(&key, &salt);
        if !bool::from(computed.as_bytes().ct_eq(stored.as_bytes())) {
            return Err(KeystoreError::InvalidPassword.into());
        }
    }

    let mut keys = Vec::with_capacity(file.keys.len());
    for (position, entry) in file.keys.iter().enumerate() {
        let iv = cb58_decode(&entry.iv)?;
        let ciphertext = cb58_decode(&entry.key)?;

        let plaintext = match decrypt_with_iv(&ciphertext, &key, &iv) {
            Ok(p) => p,
            // 6.0 没有 pass_hash，首个条目认证失败即密码错误
            Err(KeystoreError::Crypto(_)) if position == 0 && !version.has_pass_hash() => {
                return Err(KeystoreError::InvalidPassword.into());
            }
            Err(e) => return Err(e.into()),
        };

        keys.push(decode_plaintext(version, entry, &plaintext)?);
    }

    let active_index = match version {
        KeystoreVersion::V6 => file.active_index.unwrap_or(0),
        _ => 0,
    };

    tracing::debug!(
        version = %file.version,
        keys = keys.len(),
        active_index,
        "keystore decrypted"
    );

    Ok(DecryptedKeystore {
        version: file.version.clone(),
        active_index,
        keys,
    })
}

fn decode_plaintext(
    version: KeystoreVersion,
    entry: &KeystoreEntry,
    plaintext: &[u8],
) -> Result<DecryptedKey, KeystoreError> {
    if version.stores_entropy() {
        let mnemonic = bip39::Mnemonic::from_entropy(plaintext)
            .map_err(|e| KeystoreError::Malformed(format!("invalid entropy: {}", e)))?;
        return Ok(DecryptedKey {
            key: Zeroizing::new(mnemonic.to_string()),
            key_type: KeyType::Mnemonic,
        });
    }

    let text = String::from_utf8(plaintext.to_vec())
        .map_err(|_| KeystoreError::Malformed("key is not valid utf-8".into()))?;
    Ok(DecryptedKey {
        key: Zeroizing::new(text),
        key_type: entry.key_type.unwrap_or(KeyType::Mnemonic),
    })
}

/// 作用域访问：闭包返回后明文立即清零
pub fn with_decrypted<T, F>(file: &KeystoreFile, password: &str, f: F) -> WalletResult<T>
where
    F: FnOnce(&DecryptedKeystore) -> WalletResult<T>,
{
    let decrypted = decrypt(file, password)?;
    f(&decrypted)
}

/// 任意版本 → 6.0
pub fn migrate(file: &KeystoreFile, password: &str) -> WalletResult<KeystoreFile> {
    with_decrypted(file, password, |decrypted| {
        for key in &decrypted.keys {
            if key.key_type == KeyType::Mnemonic {
                parse_mnemonic(&key.key)?;
            }
        }
        let migrated = encrypt(password, &decrypted.keys, decrypted.active_index)?;
        tracing::info!(from = %file.version, to = CURRENT_VERSION, "keystore migrated");
        Ok(migrated)
    })
}

// ============ 文件 ============

pub fn read_file<P: AsRef<Path>>(path: P) -> WalletResult<KeystoreFile> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| KeystoreError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| KeystoreError::Malformed(e.to_string()).into())
}

pub fn write_file<P: AsRef<Path>>(path: P, file: &KeystoreFile) -> WalletResult<()> {
    let content = serde_json::to_string_pretty(file)?;
    std::fs::write(path.as_ref(), content)
        .map_err(|e| KeystoreError::Io(format!("{}: {}", path.as_ref().display(), e)).into())
}
