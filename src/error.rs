//! 统一错误类型
//!
//! 所有操作向直接调用方返回类型化的失败结果，不吞错误

use thiserror::Error;

use crate::domain::chain_config::ChainAlias;

/// 派生错误（致命，不可重试）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("address {0} does not belong to any known branch")]
    UnknownAddress(String),
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("key derivation failed: {0}")]
    Bip32(String),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Keystore 错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeystoreError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("unsupported keystore version: {0}")]
    UnsupportedVersion(String),
    #[error("malformed keystore: {0}")]
    Malformed(String),
    #[error("keystore crypto failure: {0}")]
    Crypto(String),
    #[error("keystore io: {0}")]
    Io(String),
}

/// 硬件签名设备传输层错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 旧固件不认识该指令
    #[error("device does not support this instruction")]
    UnsupportedInstruction,
    #[error("device rejected the request: {0}")]
    Rejected(String),
    #[error("device disconnected")]
    Disconnected,
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 链服务或索引服务调用失败（瞬时）
    #[error("{service} request failed: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("transaction {tx_id} rejected on {chain}-chain: {reason}")]
    Rejected {
        chain: ChainAlias,
        tx_id: String,
        reason: String,
    },

    #[error("transaction {tx_id} not confirmed on {chain}-chain after {attempts} attempts")]
    ConfirmationTimeout {
        chain: ChainAlias,
        tx_id: String,
        attempts: u32,
    },

    #[error("confirmation polling for {tx_id} cancelled")]
    Cancelled { tx_id: String },

    /// 设备签名的摘要与请求不一致，安全不变量，绝不降级
    #[error("device signed digest {actual} but {expected} was requested")]
    DigestMismatch { expected: String, actual: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("insufficient funds for {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: String,
        available: String,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("transfer {transfer_id} failed at {state}: {source}")]
    TransferFailed {
        transfer_id: String,
        state: String,
        export_tx_id: Option<String>,
        #[source]
        source: Box<WalletError>,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type WalletResult<T> = Result<T, WalletError>;

impl WalletError {
    pub fn network(service: &'static str, message: impl Into<String>) -> Self {
        Self::Network {
            service,
            message: message.into(),
        }
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// 稳定的错误码，供 UI 层做文案映射
    pub fn code(&self) -> &'static str {
        match self {
            Self::Derivation(DerivationError::InvalidMnemonic(_)) => "invalid_mnemonic",
            Self::Derivation(DerivationError::UnknownAddress(_)) => "unknown_address",
            Self::Derivation(_) => "derivation_failed",
            Self::Keystore(KeystoreError::InvalidPassword) => "invalid_password",
            Self::Keystore(KeystoreError::UnsupportedVersion(_)) => "unsupported_keystore_version",
            Self::Keystore(_) => "keystore_error",
            Self::Transport(_) => "device_error",
            Self::Network { .. } => "network",
            Self::Rejected { .. } => "transaction_rejected",
            Self::ConfirmationTimeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::Signing(_) => "signing_failed",
            Self::InsufficientFunds { .. } => "insufficient_balance",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::Unsupported(_) => "unsupported",
            Self::Serialization(_) => "serialization",
        }
    }

    /// 是否为瞬时错误（调用方可自行重试）
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::ConfirmationTimeout { .. } => true,
            Self::Transport(TransportError::Disconnected) => true,
            Self::TransferFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
