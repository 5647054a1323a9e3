//! 交易模型
//!
//! 未签名交易由链服务构建，签名后按固定格式序列化提交

use std::collections::BTreeSet;

use ethers::types::U256;
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    PublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    domain::{
        chain_config::{ChainAlias, TxKind},
        derivation::KeyHash,
    },
    error::{WalletError, WalletResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub utxo_id: String,
    pub asset_id: String,
    pub amount: U256,
    /// 需要签名的所有者
    pub owners: Vec<KeyHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub asset_id: String,
    pub amount: U256,
    pub owners: Vec<KeyHash>,
    pub locktime: u64,
}

/// 未签名交易
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub chain: ChainAlias,
    pub kind: TxKind,
    /// 链服务给出的序列化字节
    pub bytes: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// 找零所有者（部分交易类型没有明确找零）
    pub change_owner: Option<KeyHash>,
    /// 导出交易的目标链 / 导入交易的来源链
    pub counterparty_chain: Option<ChainAlias>,
}

impl UnsignedTx {
    /// SHA-256(bytes)
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes).into()
    }

    /// 去重后的所有签名者，保持首次出现顺序
    pub fn signers(&self) -> Vec<KeyHash> {
        let mut seen = BTreeSet::new();
        self.inputs
            .iter()
            .flat_map(|i| i.owners.iter().copied())
            .filter(|o| seen.insert(*o))
            .collect()
    }

    /// 发往指定所有者的金额
    pub fn amount_to(&self, owners: &[KeyHash], asset_id: &str) -> U256 {
        self.outputs
            .iter()
            .filter(|o| o.asset_id == asset_id && o.owners.iter().any(|x| owners.contains(x)))
            .fold(U256::zero(), |acc, o| acc + o.amount)
    }
}

/// 65 字节可恢复 secp256k1 签名 (r ‖ s ‖ v)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature(pub [u8; 65]);

impl TxSignature {
    pub fn sign(key: &SigningKey, digest: &[u8; 32]) -> WalletResult<Self> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest)
            .map_err(|e| WalletError::signing(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(Self(out))
    }

    pub fn from_slice(bytes: &[u8]) -> WalletResult<Self> {
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| WalletError::signing(format!("signature must be 65 bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }

    /// 从签名恢复公钥
    pub fn recover(&self, digest: &[u8; 32]) -> WalletResult<PublicKey> {
        let signature =
            Signature::from_slice(&self.0[..64]).map_err(|e| WalletError::signing(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.0[64])
            .ok_or_else(|| WalletError::signing("invalid recovery id"))?;
        let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
            .map_err(|e| WalletError::signing(e.to_string()))?;
        Ok(PublicKey::from(&key))
    }
}

/// 每个输入一组签名
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub signatures: Vec<TxSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub unsigned: UnsignedTx,
    pub credentials: Vec<Credential>,
}

/// 反序列化结果（链服务侧只关心字节与签名）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTx {
    pub unsigned_bytes: Vec<u8>,
    pub credentials: Vec<Credential>,
}

impl SignedTx {
    /// 编码：u32 长度 ‖ 未签名字节 ‖ u32 凭证数 ‖ (u32 签名数 ‖ 65 字节签名)*
    pub fn to_bytes(&self) -> Vec<u8> {
        let bytes = &self.unsigned.bytes;
        let mut out = Vec::with_capacity(8 + bytes.len() + self.credentials.len() * 70);
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
        out.extend_from_slice(&(self.credentials.len() as u32).to_be_bytes());
        for credential in &self.credentials {
            out.extend_from_slice(&(credential.signatures.len() as u32).to_be_bytes());
            for signature in &credential.signatures {
                out.extend_from_slice(&signature.0);
            }
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> WalletResult<DecodedTx> {
        let mut reader = ByteReader { data, pos: 0 };

        let len = reader.read_u32()? as usize;
        let unsigned_bytes = reader.take(len)?.to_vec();

        let credential_count = reader.read_u32()?;
        let mut credentials = Vec::new();
        for _ in 0..credential_count {
            let count = reader.read_u32()?;
            let mut signatures = Vec::new();
            for _ in 0..count {
                signatures.push(TxSignature::from_slice(reader.take(65)?)?);
            }
            credentials.push(Credential { signatures });
        }

        if reader.pos != data.len() {
            return Err(WalletError::signing("trailing bytes after signed tx"));
        }

        Ok(DecodedTx {
            unsigned_bytes,
            credentials,
        })
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> WalletResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| WalletError::signing("signed tx truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> WalletResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> UnsignedTx {
        UnsignedTx {
            chain: ChainAlias::X,
            kind: TxKind::Base,
            bytes: b"unsigned-body".to_vec(),
            inputs: vec![
                TxInput {
                    utxo_id: "u1".into(),
                    asset_id: "avax".into(),
                    amount: U256::from(10),
                    owners: vec![KeyHash([1; 20])],
                },
                TxInput {
                    utxo_id: "u2".into(),
                    asset_id: "avax".into(),
                    amount: U256::from(5),
                    owners: vec![KeyHash([2; 20]), KeyHash([1; 20])],
                },
            ],
            outputs: vec![TxOutput {
                asset_id: "avax".into(),
                amount: U256::from(14),
                owners: vec![KeyHash([9; 20])],
                locktime: 0,
            }],
            change_owner: None,
            counterparty_chain: None,
        }
    }

    #[test]
    fn test_signers_are_unique_and_ordered() {
        let tx = sample_tx();
        assert_eq!(tx.signers(), vec![KeyHash([1; 20]), KeyHash([2; 20])]);
        assert_eq!(tx.amount_to(&[KeyHash([9; 20])], "avax"), U256::from(14));
    }

    #[test]
    fn test_signature_recovers_public_key() {
        let key = SigningKey::from_slice(&[3u8; 32]).unwrap();
        let digest = sample_tx().digest();
        let signature = TxSignature::sign(&key, &digest).unwrap();
        let recovered = signature.recover(&digest).unwrap();
        assert_eq!(recovered, PublicKey::from(key.verifying_key()));
    }

    #[test]
    fn test_signed_tx_encoding() {
        let key = SigningKey::from_slice(&[3u8; 32]).unwrap();
        let unsigned = sample_tx();
        let signature = TxSignature::sign(&key, &unsigned.digest()).unwrap();
        let signed = SignedTx {
            unsigned: unsigned.clone(),
            credentials: vec![
                Credential {
                    signatures: vec![signature],
                },
                Credential {
                    signatures: vec![signature, signature],
                },
            ],
        };

        let decoded = SignedTx::from_bytes(&signed.to_bytes()).unwrap();
        assert_eq!(decoded.unsigned_bytes, unsigned.bytes);
        assert_eq!(decoded.credentials, signed.credentials);
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        assert!(SignedTx::from_bytes(&[0, 0, 0, 9, 1]).is_err());
        assert!(SignedTx::from_bytes(&[0, 0, 0, 0, 0, 0, 0, 0, 1]).is_err());
    }
}
