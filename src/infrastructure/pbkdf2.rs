//! PBKDF2 密钥派生模块
//! 用于从用户密码派生 keystore 加密密钥

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::infrastructure::encryption::EncryptionKey;

/// 2.0 格式的迭代次数
pub const LEGACY_ITERATIONS: u32 = 100_000;
/// 3.0 及以后的迭代次数
pub const CURRENT_ITERATIONS: u32 = 200_000;
pub const SALT_LENGTH: usize = 16; // 16字节盐值
const KEY_LENGTH: usize = 32; // 32字节密钥（AES-256）

/// 生成随机盐值
pub fn random_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// 从密码派生加密密钥
///
/// 先 SHA-256(password ‖ salt) 预哈希，再做 PBKDF2-HMAC-SHA256
pub fn derive_password_key(password: &str, salt: &[u8], iterations: u32) -> EncryptionKey {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let prehash = Zeroizing::new(hasher.finalize().to_vec());

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(&prehash, salt, iterations, &mut key);

    let derived = EncryptionKey::new(key);
    zeroize::Zeroize::zeroize(&mut key);
    derived
}
