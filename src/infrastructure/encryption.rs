//! AES-256-GCM 加密/解密模块
//! 用于 keystore 中每个密钥条目的认证加密；IV 由调用方显式保存

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeystoreError;

/// GCM 推荐的 12 字节 IV
pub const IV_LENGTH: usize = 12;

/// 加密密钥（使用Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }
}

/// 生成随机 IV，每个密钥条目一个
pub fn random_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// 加密数据
///
/// # Arguments
/// * `data` - 要加密的原始数据
/// * `key` - 32字节加密密钥
/// * `iv` - 12字节 IV，绝不能对同一密钥重复使用
pub fn encrypt_with_iv(
    data: &[u8],
    key: &EncryptionKey,
    iv: &[u8; IV_LENGTH],
) -> Result<Vec<u8>, KeystoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| KeystoreError::Crypto(format!("invalid key: {}", e)))?;

    cipher
        .encrypt(Nonce::from_slice(iv), data)
        .map_err(|e| KeystoreError::Crypto(format!("encryption failed: {}", e)))
}

/// 解密数据
///
/// 认证标签校验失败（密码错误或被篡改）返回 `Crypto`，由调用方决定语义
pub fn decrypt_with_iv(
    ciphertext: &[u8],
    key: &EncryptionKey,
    iv: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    if iv.len() != IV_LENGTH {
        return Err(KeystoreError::Malformed(format!(
            "iv must be {} bytes, got {}",
            IV_LENGTH,
            iv.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| KeystoreError::Crypto(format!("invalid key: {}", e)))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| KeystoreError::Crypto("authentication failed".into()))?;

    Ok(Zeroizing::new(plaintext))
}
